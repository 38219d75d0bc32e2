//! Integration tests for record, gap and next-key locking.

use ridgedb_core::{
    CompositeKey, CoreError, LockConfig, LockMode, LockOutcome, LockState, NextKeyLockManager,
    RecordKey, TransactionId, PRIMARY_INDEX,
};
use ridgedb_testkit::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const T1: TransactionId = TransactionId::new(1);
const T2: TransactionId = TransactionId::new(2);
const T3: TransactionId = TransactionId::new(3);

fn key(n: i64) -> CompositeKey {
    CompositeKey::from(n)
}

fn record(n: i64) -> RecordKey {
    RecordKey::new("users", PRIMARY_INDEX, key(n))
}

#[test]
fn next_key_lock_prevents_phantom_inserts() {
    init_test_tracing();
    let locks = NextKeyLockManager::default();

    // T1 scans 10 < id <= 20 and locks every next-key interval it visits.
    let outcome = locks.lock_next_key(T1, "users", PRIMARY_INDEX, Some(&key(10)), Some(&key(15)), LockMode::Shared);
    assert!(outcome.is_granted());
    let outcome = locks.lock_next_key(T1, "users", PRIMARY_INDEX, Some(&key(15)), Some(&key(20)), LockMode::Shared);
    assert!(outcome.is_granted());

    for phantom in [11, 15, 17, 20] {
        assert!(locks.blocks_insert(T2, "users", PRIMARY_INDEX, &key(phantom)), "{phantom}");
    }
    for outside in [5, 10, 21] {
        assert!(!locks.blocks_insert(T2, "users", PRIMARY_INDEX, &key(outside)), "{outside}");
    }
    assert!(!locks.blocks_insert(T1, "users", PRIMARY_INDEX, &key(17)));

    assert_eq!(
        locks.insert_intention(T2, "users", PRIMARY_INDEX, &key(17)),
        LockOutcome::Waiting
    );
    let summary = locks.release_all(T1);
    assert_eq!(summary.intentions, vec![(T2, record(17))]);
    assert!(!locks.blocks_insert(T2, "users", PRIMARY_INDEX, &key(17)));
}

#[test]
fn shared_readers_block_writer_until_release() {
    let locks = NextKeyLockManager::default();
    let records = locks.records();

    assert!(records.lock(T1, &record(5), LockMode::Shared).is_granted());
    assert!(records.lock(T2, &record(5), LockMode::Shared).is_granted());
    assert_eq!(records.lock(T3, &record(5), LockMode::Exclusive), LockOutcome::Waiting);
    assert_eq!(records.lock_state(T3, &record(5)), LockState::Waiting);

    assert!(locks.release_all(T1).is_empty());
    let summary = locks.release_all(T2);
    assert_eq!(summary.records, vec![(T3, record(5))]);
    assert_eq!(records.holders(&record(5)), vec![(T3, LockMode::Exclusive)]);
}

#[test]
fn blocking_wait_returns_once_holder_releases() {
    let locks = Arc::new(NextKeyLockManager::default());
    assert!(locks.records().lock(T1, &record(1), LockMode::Exclusive).is_granted());

    let waiter = {
        let locks = Arc::clone(&locks);
        thread::spawn(move || {
            locks
                .records()
                .lock_wait_timeout(T2, &record(1), LockMode::Shared, Duration::from_secs(10))
        })
    };
    while locks.records().waiters(&record(1)).is_empty() {
        thread::yield_now();
    }

    locks.release_all(T1);
    waiter.join().unwrap().unwrap();
    assert_eq!(locks.records().lock_state(T2, &record(1)), LockState::Granted);
}

#[test]
fn blocking_wait_times_out_without_release() {
    let locks = NextKeyLockManager::new(LockConfig::new().wait_timeout(Duration::from_millis(25)));
    assert!(locks.records().lock(T1, &record(1), LockMode::Exclusive).is_granted());

    let err = locks
        .records()
        .lock_wait(T2, &record(1), LockMode::Exclusive)
        .unwrap_err();
    match err {
        CoreError::LockWaitTimeout { resource } => assert_eq!(resource, "users.PRIMARY(1)"),
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(locks.records().lock_state(T2, &record(1)), LockState::Released);

    locks.release_all(T1);
    assert!(locks.records().lock(T2, &record(1), LockMode::Exclusive).is_granted());
}

#[test]
fn blocked_insert_waits_for_gap_release() {
    let locks = Arc::new(NextKeyLockManager::default());
    locks.lock_next_key(T1, "users", PRIMARY_INDEX, Some(&key(100)), None, LockMode::Shared);

    let inserter = {
        let locks = Arc::clone(&locks);
        thread::spawn(move || {
            locks.gaps().insert_intention_wait_timeout(
                T2,
                "users",
                PRIMARY_INDEX,
                &key(500),
                Duration::from_secs(10),
            )
        })
    };
    while locks.gaps().intention_state(T2, "users", PRIMARY_INDEX, &key(500)) != LockState::Waiting {
        thread::yield_now();
    }

    locks.release_all(T1);
    inserter.join().unwrap().unwrap();
}

#[test]
fn contended_exclusive_locks_all_complete() {
    let locks = ridgedb_core::RecordLockManager::default();
    let result = stress_lock_contention(
        &locks,
        &StressConfig {
            operations: 200,
            threads: 4,
            key_space: 4,
        },
    );
    assert_eq!(result.successful_ops, 800);
    assert_eq!(locks.resource_count(), 0);
}
