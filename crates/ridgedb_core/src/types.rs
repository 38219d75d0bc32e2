//! Core type definitions for RidgeDB.

use ridgedb_storage::PageId;
use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction ids are assigned by the transaction layer; this crate only
/// compares them and uses them to own locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Physical address of an entry: the page holding it and its slot in that page.
///
/// Locators are only stable until the next structural change of the
/// owning index (a split or merge moves entries between pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowLocator {
    /// Page holding the entry.
    pub page_id: PageId,
    /// Position of the entry within the page.
    pub slot: u16,
}

impl RowLocator {
    /// Creates a new locator.
    #[must_use]
    pub const fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RowLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/slot:{}", self.page_id, self.slot)
    }
}
