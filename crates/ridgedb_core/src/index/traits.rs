//! The seam between the index manager and derived indexes.

use crate::error::CoreResult;
use crate::index::descriptor::IndexDescriptor;
use crate::index::secondary::KeyScan;
use crate::key::CompositeKey;
use crate::schema::Row;

/// An index derived from a table's rows.
///
/// Secondary, hash and full-text indexes all map some projection of a row
/// back to the row's primary key; the clustered index is then consulted for
/// the row itself. Every implementation serializes its own operations behind
/// one internal lock, so methods take `&self`.
pub trait RowIndex: Send + Sync {
    /// Returns the index descriptor.
    fn descriptor(&self) -> &IndexDescriptor;

    /// Adds the entry for `row`.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if a unique index already holds the key.
    fn insert_row(&self, row: &Row) -> CoreResult<()>;

    /// Removes the entry for `row`. Returns false if it was not present.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying pages cannot be read or written.
    fn delete_row(&self, row: &Row) -> CoreResult<bool>;

    /// Replaces the entry for `old` with the entry for `new`.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if `new` collides on a unique index; the
    /// entry for `old` is then kept.
    fn update_row(&self, old: &Row, new: &Row) -> CoreResult<()> {
        let d = self.descriptor();
        if d.key_of(old) == d.key_of(new) && d.primary_key_of(old) == d.primary_key_of(new) {
            return Ok(());
        }
        self.delete_row(old)?;
        if let Err(e) = self.insert_row(new) {
            self.insert_row(old)?;
            return Err(e);
        }
        Ok(())
    }

    /// Returns the primary keys of rows whose index key equals `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying pages cannot be read.
    fn lookup(&self, key: &CompositeKey) -> CoreResult<Vec<CompositeKey>>;

    /// Returns the primary keys of rows with `start <= index key <= end`, in
    /// index-key order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for indexes without key order.
    fn range_scan(
        &self,
        start: Option<&CompositeKey>,
        end: Option<&CompositeKey>,
    ) -> CoreResult<KeyScan>;

    /// Returns the number of entries.
    fn len(&self) -> u64;

    /// Returns true if the index holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes any page store behind the index.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the flush fails.
    fn flush(&self) -> CoreResult<()> {
        Ok(())
    }
}
