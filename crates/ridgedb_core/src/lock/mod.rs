//! Logical row locks: record, gap and next-key.
//!
//! Locks are keyed by `(table, index, key)` rather than by page, and belong
//! to a transaction until it releases all of them at commit or rollback.
//!
//! | held \ requested | S        | X        | insert intention |
//! |------------------|----------|----------|------------------|
//! | record S         | ok       | conflict | n/a              |
//! | record X         | conflict | conflict | n/a              |
//! | gap              | n/a      | n/a      | conflict         |
//!
//! Gap locks never conflict with each other. A transaction never conflicts
//! with itself.
//!
//! Requests that conflict are recorded as waiting and reported as
//! [`LockOutcome::Waiting`]; callers either poll [`RecordLockManager::lock_state`]
//! or use the blocking `*_wait` variants, which sleep until the request is
//! promoted or the configured timeout passes. There is no deadlock
//! detection.

mod gap;
mod next_key;
mod record;

pub use gap::{Gap, GapLockManager};
pub use next_key::{NextKeyLockManager, ReleaseSummary};
pub use record::RecordLockManager;

use crate::key::CompositeKey;
use std::fmt;

/// Record lock strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Read lock; compatible with other shared locks.
    Shared,
    /// Write lock; compatible with nothing.
    Exclusive,
}

impl LockMode {
    /// Returns true if a holder in `self` mode admits a request in `other`.
    #[must_use]
    pub fn is_compatible(self, other: LockMode) -> bool {
        self == LockMode::Shared && other == LockMode::Shared
    }

    /// Returns the stronger of two modes.
    #[must_use]
    pub fn max(self, other: LockMode) -> LockMode {
        if self == LockMode::Exclusive || other == LockMode::Exclusive {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockMode::Shared => "S",
            LockMode::Exclusive => "X",
        })
    }
}

/// Result of a non-blocking lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock is held.
    Granted,
    /// The request is queued behind a conflicting lock.
    Waiting,
}

impl LockOutcome {
    /// Returns true for [`LockOutcome::Granted`].
    #[must_use]
    pub fn is_granted(self) -> bool {
        self == LockOutcome::Granted
    }
}

/// Where a transaction's request on a resource stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Queued behind a conflicting lock.
    Waiting,
    /// Held.
    Granted,
    /// Not requested, or already released.
    Released,
}

/// A lockable row: one key of one index of one table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    /// Table name.
    pub table: String,
    /// Index name.
    pub index: String,
    /// Index key.
    pub key: CompositeKey,
}

impl RecordKey {
    /// Creates a resource key.
    pub fn new(table: impl Into<String>, index: impl Into<String>, key: CompositeKey) -> Self {
        Self {
            table: table.into(),
            index: index.into(),
            key,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.table, self.index, self.key)
    }
}
