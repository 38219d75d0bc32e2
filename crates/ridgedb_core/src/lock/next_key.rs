use crate::config::LockConfig;
use crate::key::CompositeKey;
use crate::lock::{Gap, GapLockManager, LockMode, LockOutcome, RecordKey, RecordLockManager};
use crate::types::TransactionId;
use std::sync::Arc;
use tracing::trace;

/// What a transaction's release promoted in each lock table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    /// Record lock requests granted by the release.
    pub records: Vec<(TransactionId, RecordKey)>,
    /// Insert intentions unblocked by the release.
    pub intentions: Vec<(TransactionId, RecordKey)>,
}

impl ReleaseSummary {
    /// Returns true if nothing was promoted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.intentions.is_empty()
    }
}

/// Next-key locking: a record lock on a key plus the gap below it.
///
/// Both halves live in their own managers, shared through `Arc` so plain
/// record or gap locks taken elsewhere see the same state.
#[derive(Debug, Clone)]
pub struct NextKeyLockManager {
    records: Arc<RecordLockManager>,
    gaps: Arc<GapLockManager>,
}

impl NextKeyLockManager {
    /// Creates a manager with fresh record and gap tables.
    #[must_use]
    pub fn new(config: LockConfig) -> Self {
        Self {
            records: Arc::new(RecordLockManager::new(config.clone())),
            gaps: Arc::new(GapLockManager::new(config)),
        }
    }

    /// Creates a manager over existing tables.
    #[must_use]
    pub fn with_managers(records: Arc<RecordLockManager>, gaps: Arc<GapLockManager>) -> Self {
        Self { records, gaps }
    }

    /// Returns the record lock table.
    #[must_use]
    pub fn records(&self) -> &Arc<RecordLockManager> {
        &self.records
    }

    /// Returns the gap lock table.
    #[must_use]
    pub fn gaps(&self) -> &Arc<GapLockManager> {
        &self.gaps
    }

    /// Locks `key` in `mode` and the gap `(prev, key]`.
    ///
    /// `prev` is the key immediately below `key` in the index, or `None` at
    /// the start of the index. `key = None` locks the supremum: no record,
    /// only the gap above `prev`. The gap is always granted; the outcome is
    /// that of the record lock.
    pub fn lock_next_key(
        &self,
        txn: TransactionId,
        table: &str,
        index: &str,
        prev: Option<&CompositeKey>,
        key: Option<&CompositeKey>,
        mode: LockMode,
    ) -> LockOutcome {
        let gap = Gap::next_key(prev, key);
        trace!(txn = %txn, table, index, gap = %gap, mode = %mode, "next-key lock");
        self.gaps.lock_gap(txn, table, index, gap);
        match key {
            Some(key) => self
                .records
                .lock(txn, &RecordKey::new(table, index, key.clone()), mode),
            None => LockOutcome::Granted,
        }
    }

    /// Returns true if another transaction's gap covers `key`.
    #[must_use]
    pub fn blocks_insert(&self, txn: TransactionId, table: &str, index: &str, key: &CompositeKey) -> bool {
        self.gaps.blocks_insert(txn, table, index, key)
    }

    /// Declares an insert intention; see [`GapLockManager::insert_intention`].
    pub fn insert_intention(
        &self,
        txn: TransactionId,
        table: &str,
        index: &str,
        key: &CompositeKey,
    ) -> LockOutcome {
        self.gaps.insert_intention(txn, table, index, key)
    }

    /// Releases everything `txn` holds in both tables.
    pub fn release_all(&self, txn: TransactionId) -> ReleaseSummary {
        ReleaseSummary {
            records: self.records.release_all(txn),
            intentions: self.gaps.release_all(txn),
        }
    }
}

impl Default for NextKeyLockManager {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockState;

    fn t(id: u64) -> TransactionId {
        TransactionId::new(id)
    }

    fn k(n: i64) -> CompositeKey {
        CompositeKey::from(n)
    }

    #[test]
    fn next_key_prevents_phantoms() {
        let m = NextKeyLockManager::default();
        let outcome = m.lock_next_key(t(1), "t", "PRIMARY", Some(&k(10)), Some(&k(20)), LockMode::Shared);
        assert!(outcome.is_granted());

        assert!(m.blocks_insert(t(2), "t", "PRIMARY", &k(15)));
        assert!(m.blocks_insert(t(2), "t", "PRIMARY", &k(20)));
        assert!(!m.blocks_insert(t(2), "t", "PRIMARY", &k(10)));
        assert!(!m.blocks_insert(t(2), "t", "PRIMARY", &k(25)));
        assert!(!m.blocks_insert(t(1), "t", "PRIMARY", &k(15)));
    }

    #[test]
    fn next_key_record_half_conflicts() {
        let m = NextKeyLockManager::default();
        m.lock_next_key(t(1), "t", "PRIMARY", Some(&k(10)), Some(&k(20)), LockMode::Exclusive);
        let outcome = m.lock_next_key(t(2), "t", "PRIMARY", Some(&k(10)), Some(&k(20)), LockMode::Shared);
        assert_eq!(outcome, LockOutcome::Waiting);

        let summary = m.release_all(t(1));
        assert_eq!(summary.records, vec![(t(2), RecordKey::new("t", "PRIMARY", k(20)))]);
        assert!(summary.intentions.is_empty());
    }

    #[test]
    fn supremum_lock_covers_tail() {
        let m = NextKeyLockManager::default();
        assert!(m
            .lock_next_key(t(1), "t", "PRIMARY", Some(&k(100)), None, LockMode::Shared)
            .is_granted());
        assert!(m.blocks_insert(t(2), "t", "PRIMARY", &k(i64::MAX)));
        assert!(!m.blocks_insert(t(2), "t", "PRIMARY", &k(100)));
        assert_eq!(m.records().resource_count(), 0);
    }

    #[test]
    fn release_promotes_intentions() {
        let m = NextKeyLockManager::default();
        m.lock_next_key(t(1), "t", "PRIMARY", None, Some(&k(5)), LockMode::Shared);
        assert_eq!(m.insert_intention(t(2), "t", "PRIMARY", &k(3)), LockOutcome::Waiting);

        let summary = m.release_all(t(1));
        assert_eq!(summary.intentions, vec![(t(2), RecordKey::new("t", "PRIMARY", k(3)))]);
        assert_eq!(
            m.gaps().intention_state(t(2), "t", "PRIMARY", &k(3)),
            LockState::Granted
        );
        assert!(m.release_all(t(2)).is_empty());
    }

    #[test]
    fn shared_tables_see_same_state() {
        let records = Arc::new(RecordLockManager::default());
        let gaps = Arc::new(GapLockManager::default());
        let m = NextKeyLockManager::with_managers(Arc::clone(&records), Arc::clone(&gaps));
        m.lock_next_key(t(1), "t", "PRIMARY", None, Some(&k(1)), LockMode::Exclusive);
        assert_eq!(records.holders(&RecordKey::new("t", "PRIMARY", k(1))).len(), 1);
        assert!(gaps.blocks_insert(t(2), "t", "PRIMARY", &k(0)));
    }
}
