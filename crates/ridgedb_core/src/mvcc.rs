//! Multi-version visibility boundary.
//!
//! Version chains live outside this crate. The clustered index only needs
//! two things from the MVCC layer: a [`ReadView`] describing a snapshot, and
//! a [`VersionResolver`] that maps the latest stored row to the version a
//! snapshot may see.

use crate::schema::Row;
use crate::types::TransactionId;

/// A consistent-read snapshot.
///
/// Visibility of a change made by transaction `t`:
///
/// - `t == creator`: visible (own changes)
/// - `t < up_limit`: visible (committed before every active transaction)
/// - `t >= low_limit`: invisible (started after the snapshot)
/// - otherwise visible iff `t` was not active when the snapshot was taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadView {
    creator: TransactionId,
    up_limit: TransactionId,
    low_limit: TransactionId,
    active: Vec<TransactionId>,
}

impl ReadView {
    /// Creates a read view.
    ///
    /// `active` lists transactions running when the snapshot was taken and
    /// `next_id` is the id the next new transaction would receive.
    pub fn new(
        creator: TransactionId,
        active: impl IntoIterator<Item = TransactionId>,
        next_id: TransactionId,
    ) -> Self {
        let mut active: Vec<TransactionId> = active
            .into_iter()
            .filter(|t| *t != creator && *t < next_id)
            .collect();
        active.sort_unstable();
        active.dedup();
        let up_limit = active.first().copied().unwrap_or(next_id);
        Self {
            creator,
            up_limit,
            low_limit: next_id,
            active,
        }
    }

    /// Returns the transaction that owns this view.
    #[must_use]
    pub fn creator(&self) -> TransactionId {
        self.creator
    }

    /// Returns the smallest transaction id that was active.
    #[must_use]
    pub fn up_limit(&self) -> TransactionId {
        self.up_limit
    }

    /// Returns the first transaction id this view never sees.
    #[must_use]
    pub fn low_limit(&self) -> TransactionId {
        self.low_limit
    }

    /// Returns true if changes made by `txn` are visible to this view.
    #[must_use]
    pub fn is_visible(&self, txn: TransactionId) -> bool {
        if txn == self.creator || txn < self.up_limit {
            return true;
        }
        if txn >= self.low_limit {
            return false;
        }
        self.active.binary_search(&txn).is_err()
    }
}

/// Resolves the row version visible to a snapshot.
pub trait VersionResolver {
    /// Returns the version of `row` visible to `view`, or `None` if no
    /// version is visible.
    fn find_visible_version(&self, row: &Row, view: &ReadView) -> Option<Row>;
}

impl<F> VersionResolver for F
where
    F: Fn(&Row, &ReadView) -> Option<Row>,
{
    fn find_visible_version(&self, row: &Row, view: &ReadView) -> Option<Row> {
        self(row, view)
    }
}

/// Resolver for tables without version chains: every stored row is visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestVersion;

impl VersionResolver for LatestVersion {
    fn find_visible_version(&self, row: &Row, _view: &ReadView) -> Option<Row> {
        Some(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(n: u64) -> TransactionId {
        TransactionId::new(n)
    }

    #[test]
    fn own_changes_visible() {
        let view = ReadView::new(txn(5), [txn(3), txn(5)], txn(10));
        assert!(view.is_visible(txn(5)));
    }

    #[test]
    fn committed_before_snapshot_visible() {
        let view = ReadView::new(txn(5), [txn(3), txn(7)], txn(10));
        assert_eq!(view.up_limit(), txn(3));
        assert!(view.is_visible(txn(1)));
        assert!(view.is_visible(txn(4)));
    }

    #[test]
    fn active_transactions_invisible() {
        let view = ReadView::new(txn(5), [txn(3), txn(7)], txn(10));
        assert!(!view.is_visible(txn(3)));
        assert!(!view.is_visible(txn(7)));
    }

    #[test]
    fn future_transactions_invisible() {
        let view = ReadView::new(txn(5), [], txn(10));
        assert_eq!(view.up_limit(), txn(10));
        assert!(!view.is_visible(txn(10)));
        assert!(!view.is_visible(txn(42)));
        assert!(view.is_visible(txn(9)));
    }

    #[test]
    fn closure_resolver() {
        let hide_all = |_: &Row, _: &ReadView| None;
        let view = ReadView::new(txn(1), [], txn(2));
        let row = Row::new(vec![1.into()]);
        assert!(hide_all.find_visible_version(&row, &view).is_none());
        assert_eq!(LatestVersion.find_visible_version(&row, &view), Some(row));
    }
}
