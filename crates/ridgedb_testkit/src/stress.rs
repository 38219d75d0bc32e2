//! Stress harnesses for RidgeDB.
//!
//! These run many operations from several threads against one index manager
//! or lock table and report throughput.

use crate::fixtures::{user_row, TEST_DATABASE};
use ridgedb_core::{
    CompositeKey, IndexManager, LockMode, RecordKey, RecordLockManager, TransactionId,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct keys contended over.
    pub key_space: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            key_space: 64,
        }
    }
}

fn summarize(outcomes: Vec<(usize, usize)>, started: Instant) -> StressTestResult {
    let (ok, failed) = outcomes
        .into_iter()
        .fold((0, 0), |(a, b), (ok, failed)| (a + ok, b + failed));
    StressTestResult::new(ok, failed, started.elapsed())
}

/// Inserts disjoint ranges of `users` rows from every thread.
///
/// Thread `t` inserts ids `t * operations .. (t + 1) * operations`, so no
/// insert should fail on a correctly synchronized manager. The `users`
/// table must already exist.
pub fn stress_concurrent_inserts(manager: &IndexManager, config: &StressConfig) -> StressTestResult {
    let started = Instant::now();
    let outcomes: Vec<(usize, usize)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                scope.spawn(move || {
                    let mut ok = 0usize;
                    let mut failed = 0usize;
                    for i in 0..config.operations {
                        let id = (t * config.operations + i) as i64;
                        let city = if id % 2 == 0 { "oslo" } else { "bergen" };
                        let row = user_row(id, &format!("user{id}"), city, None);
                        match manager.insert_row(TEST_DATABASE, "users", &row) {
                            Ok(()) => ok += 1,
                            Err(_) => failed += 1,
                        }
                    }
                    (ok, failed)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("stress thread panicked"))
            .collect()
    });
    summarize(outcomes, started)
}

/// Has every thread lock random-ish keys exclusively with blocking waits,
/// releasing after each grant.
///
/// Failed operations are wait timeouts.
pub fn stress_lock_contention(locks: &RecordLockManager, config: &StressConfig) -> StressTestResult {
    let next_txn = AtomicU64::new(1);
    let started = Instant::now();
    let outcomes: Vec<(usize, usize)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                let next_txn = &next_txn;
                scope.spawn(move || {
                    let mut ok = 0usize;
                    let mut failed = 0usize;
                    for i in 0..config.operations {
                        let txn = TransactionId::new(next_txn.fetch_add(1, Ordering::Relaxed));
                        let slot = (i * 31 + t * 17) % config.key_space.max(1);
                        let key = RecordKey::new("users", "PRIMARY", CompositeKey::from(slot as i64));
                        match locks.lock_wait(txn, &key, LockMode::Exclusive) {
                            Ok(()) => ok += 1,
                            Err(_) => failed += 1,
                        }
                        locks.release_all(txn);
                    }
                    (ok, failed)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("stress thread panicked"))
            .collect()
    });
    summarize(outcomes, started)
}
