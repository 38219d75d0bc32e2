use crate::config::LockConfig;
use crate::error::{CoreError, CoreResult};
use crate::key::CompositeKey;
use crate::lock::{LockOutcome, LockState, RecordKey};
use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::ops::Bound;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// An interval of index keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    /// Lower end.
    pub lower: Bound<CompositeKey>,
    /// Upper end.
    pub upper: Bound<CompositeKey>,
}

impl Gap {
    /// Creates a gap from explicit bounds.
    #[must_use]
    pub fn new(lower: Bound<CompositeKey>, upper: Bound<CompositeKey>) -> Self {
        Self { lower, upper }
    }

    /// The gap a next-key lock on `key` covers: `(prev, key]`.
    ///
    /// A missing `prev` means the gap starts at the lowest key; a missing
    /// `key` is the supremum, covering everything above `prev`.
    #[must_use]
    pub fn next_key(prev: Option<&CompositeKey>, key: Option<&CompositeKey>) -> Self {
        Self {
            lower: prev.map_or(Bound::Unbounded, |k| Bound::Excluded(k.clone())),
            upper: key.map_or(Bound::Unbounded, |k| Bound::Included(k.clone())),
        }
    }

    /// Returns true if `key` falls inside the gap.
    #[must_use]
    pub fn contains(&self, key: &CompositeKey) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above && below
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Included(k) => write!(f, "[{k}")?,
            Bound::Excluded(k) => write!(f, "({k}")?,
            Bound::Unbounded => f.write_str("(-inf")?,
        }
        f.write_str(", ")?;
        match &self.upper {
            Bound::Included(k) => write!(f, "{k}]"),
            Bound::Excluded(k) => write!(f, "{k})"),
            Bound::Unbounded => f.write_str("+inf)"),
        }
    }
}

#[derive(Debug)]
struct GapLock {
    txn: TransactionId,
    gap: Gap,
}

#[derive(Debug)]
struct Intention {
    txn: TransactionId,
    target: RecordKey,
    granted: bool,
}

#[derive(Debug, Default)]
struct Inner {
    gaps: HashMap<(String, String), Vec<GapLock>>,
    intentions: Vec<Intention>,
}

impl Inner {
    fn blocked(&self, txn: TransactionId, target: &RecordKey) -> bool {
        self.gaps
            .get(&(target.table.clone(), target.index.clone()))
            .is_some_and(|locks| {
                locks
                    .iter()
                    .any(|l| l.txn != txn && l.gap.contains(&target.key))
            })
    }

    fn intention(&self, txn: TransactionId, target: &RecordKey) -> Option<&Intention> {
        self.intentions
            .iter()
            .find(|i| i.txn == txn && i.target == *target)
    }

    fn request(&mut self, txn: TransactionId, target: &RecordKey) -> LockOutcome {
        if let Some(existing) = self.intention(txn, target) {
            if existing.granted {
                return LockOutcome::Granted;
            }
        }
        let granted = !self.blocked(txn, target);
        match self
            .intentions
            .iter_mut()
            .find(|i| i.txn == txn && i.target == *target)
        {
            Some(existing) => existing.granted = granted,
            None => self.intentions.push(Intention {
                txn,
                target: target.clone(),
                granted,
            }),
        }
        if granted {
            trace!(txn = %txn, target = %target, "insert intention granted");
            LockOutcome::Granted
        } else {
            debug!(txn = %txn, target = %target, "insert intention waiting");
            LockOutcome::Waiting
        }
    }

    fn state(&self, txn: TransactionId, target: &RecordKey) -> LockState {
        match self.intention(txn, target) {
            Some(i) if i.granted => LockState::Granted,
            Some(_) => LockState::Waiting,
            None => LockState::Released,
        }
    }
}

/// Gap locks and the insert intentions they block.
///
/// Gap locks never conflict with one another, so [`GapLockManager::lock_gap`]
/// always grants. They only matter to inserts: an insert of key `k` by
/// transaction `T` is blocked while another transaction holds a gap on the
/// same index that contains `k`.
#[derive(Debug)]
pub struct GapLockManager {
    inner: Mutex<Inner>,
    changed: Condvar,
    config: LockConfig,
}

impl GapLockManager {
    /// Creates an empty gap lock table.
    #[must_use]
    pub fn new(config: LockConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            changed: Condvar::new(),
            config,
        }
    }

    /// Locks `gap` on `table.index` for `txn`.
    pub fn lock_gap(&self, txn: TransactionId, table: &str, index: &str, gap: Gap) -> LockOutcome {
        let mut inner = self.inner.lock();
        let locks = inner
            .gaps
            .entry((table.to_string(), index.to_string()))
            .or_default();
        if !locks.iter().any(|l| l.txn == txn && l.gap == gap) {
            trace!(txn = %txn, table, index, gap = %gap, "gap lock granted");
            locks.push(GapLock { txn, gap });
        }
        LockOutcome::Granted
    }

    /// Returns true if a gap held by a transaction other than `txn` covers
    /// `key` on `table.index`.
    #[must_use]
    pub fn blocks_insert(&self, txn: TransactionId, table: &str, index: &str, key: &CompositeKey) -> bool {
        self.inner
            .lock()
            .blocked(txn, &RecordKey::new(table, index, key.clone()))
    }

    /// Declares that `txn` intends to insert `key` into `table.index`.
    ///
    /// Returns `Waiting` while the key lies in another transaction's gap;
    /// the intention is promoted when that transaction releases.
    pub fn insert_intention(
        &self,
        txn: TransactionId,
        table: &str,
        index: &str,
        key: &CompositeKey,
    ) -> LockOutcome {
        self.inner
            .lock()
            .request(txn, &RecordKey::new(table, index, key.clone()))
    }

    /// Declares an insert intention and blocks until it is granted or the
    /// configured wait timeout passes.
    ///
    /// # Errors
    ///
    /// Returns `LockWaitTimeout` on timeout; the intention is then withdrawn.
    pub fn insert_intention_wait(
        &self,
        txn: TransactionId,
        table: &str,
        index: &str,
        key: &CompositeKey,
    ) -> CoreResult<()> {
        self.insert_intention_wait_timeout(txn, table, index, key, self.config.wait_timeout)
    }

    /// Like [`GapLockManager::insert_intention_wait`] with an explicit timeout.
    ///
    /// # Errors
    ///
    /// Returns `LockWaitTimeout` on timeout; the intention is then withdrawn.
    pub fn insert_intention_wait_timeout(
        &self,
        txn: TransactionId,
        table: &str,
        index: &str,
        key: &CompositeKey,
        timeout: Duration,
    ) -> CoreResult<()> {
        let deadline = Instant::now() + timeout;
        let target = RecordKey::new(table, index, key.clone());
        let mut inner = self.inner.lock();
        if inner.request(txn, &target).is_granted() {
            return Ok(());
        }

        loop {
            let timed_out = self.changed.wait_until(&mut inner, deadline).timed_out();
            match inner.state(txn, &target) {
                LockState::Granted => return Ok(()),
                LockState::Released => {
                    return Err(CoreError::invalid_operation(format!(
                        "insert intention of {txn} on {target} was released while waiting"
                    )))
                }
                LockState::Waiting if !timed_out => {}
                LockState::Waiting => {
                    inner.intentions.retain(|i| !(i.txn == txn && i.target == target));
                    debug!(txn = %txn, target = %target, ?timeout, "insert intention timed out");
                    return Err(CoreError::LockWaitTimeout {
                        resource: target.to_string(),
                    });
                }
            }
        }
    }

    /// Returns where `txn`'s insert intention on `key` stands.
    #[must_use]
    pub fn intention_state(
        &self,
        txn: TransactionId,
        table: &str,
        index: &str,
        key: &CompositeKey,
    ) -> LockState {
        self.inner
            .lock()
            .state(txn, &RecordKey::new(table, index, key.clone()))
    }

    /// Returns the gaps `txn` holds on `table.index`.
    #[must_use]
    pub fn gaps_held(&self, txn: TransactionId, table: &str, index: &str) -> Vec<Gap> {
        self.inner
            .lock()
            .gaps
            .get(&(table.to_string(), index.to_string()))
            .map(|locks| {
                locks
                    .iter()
                    .filter(|l| l.txn == txn)
                    .map(|l| l.gap.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Releases every gap and insert intention of `txn`.
    ///
    /// Returns the insert intentions of other transactions that are no
    /// longer blocked, in the order they were declared.
    pub fn release_all(&self, txn: TransactionId) -> Vec<(TransactionId, RecordKey)> {
        let mut inner = self.inner.lock();
        inner.gaps.retain(|_, locks| {
            locks.retain(|l| l.txn != txn);
            !locks.is_empty()
        });
        inner.intentions.retain(|i| i.txn != txn);

        let unblocked: Vec<usize> = inner
            .intentions
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.granted && !inner.blocked(i.txn, &i.target))
            .map(|(slot, _)| slot)
            .collect();
        let mut promoted = Vec::with_capacity(unblocked.len());
        for slot in unblocked {
            let intention = &mut inner.intentions[slot];
            intention.granted = true;
            debug!(txn = %intention.txn, target = %intention.target, "insert intention promoted");
            promoted.push((intention.txn, intention.target.clone()));
        }
        drop(inner);

        if !promoted.is_empty() {
            self.changed.notify_all();
        }
        promoted
    }
}

impl Default for GapLockManager {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}
