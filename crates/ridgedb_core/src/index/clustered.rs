//! Clustered primary-key index.
//!
//! The clustered index is the table: its leaves hold whole serialized rows
//! keyed by primary key. Every public operation runs under the index's own
//! mutex, so concurrent callers on one table's clustered index serialize
//! while other indexes proceed independently.

use crate::btree::{BPlusTree, TreeCursor, TreeStats};
use crate::config::IndexConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::descriptor::IndexDescriptor;
use crate::key::CompositeKey;
use crate::mvcc::{ReadView, VersionResolver};
use crate::schema::{Row, TableSchema};
use crate::types::RowLocator;
use parking_lot::Mutex;
use ridgedb_storage::PageStore;
use std::ops::Bound;
use std::sync::Arc;
use tracing::trace;

/// A table's row storage, ordered by primary key.
pub struct ClusteredIndex {
    descriptor: Arc<IndexDescriptor>,
    schema: Arc<TableSchema>,
    tree: Arc<Mutex<BPlusTree>>,
}

impl ClusteredIndex {
    /// Opens the clustered index in `store`, creating it if the store is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store holds something other than a B-Tree.
    pub fn open(
        descriptor: Arc<IndexDescriptor>,
        schema: Arc<TableSchema>,
        store: Box<dyn PageStore>,
        config: &IndexConfig,
    ) -> CoreResult<Self> {
        let tree = BPlusTree::open_or_create(descriptor.qualified_name(), store, config)?;
        Ok(Self {
            descriptor,
            schema,
            tree: Arc::new(Mutex::new(tree)),
        })
    }

    /// Returns the index descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<IndexDescriptor> {
        &self.descriptor
    }

    /// Returns the table schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.tree.lock().len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the row does not match the schema and
    /// `ConstraintViolation` if its primary key is taken.
    pub fn insert(&self, row: &Row) -> CoreResult<()> {
        row.validate(&self.schema)?;
        let key = row.primary_key(&self.schema);
        self.tree.lock().insert(key, row.serialize())
    }

    /// Replaces `old` with `new`.
    ///
    /// A row keeping its primary key is rewritten in its leaf slot. A changed
    /// primary key deletes the old row and inserts the new one; both happen
    /// under one acquisition of the index lock, and a conflicting new key
    /// leaves the old row in place.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `old` is not stored and
    /// `ConstraintViolation` if the new primary key is taken.
    pub fn update(&self, old: &Row, new: &Row) -> CoreResult<()> {
        new.validate(&self.schema)?;
        let old_key = old.primary_key(&self.schema);
        let new_key = new.primary_key(&self.schema);
        let mut tree = self.tree.lock();

        if old_key == new_key {
            if !tree.update(&new_key, new.serialize())? {
                return Err(self.missing_row(&old_key));
            }
            return Ok(());
        }

        if !tree.contains(&old_key)? {
            return Err(self.missing_row(&old_key));
        }
        if tree.contains(&new_key)? {
            return Err(CoreError::constraint_violation(
                self.descriptor.qualified_name(),
                new_key.to_string(),
            ));
        }
        let bytes = new.serialize();
        tree.check_entry(new_key.to_bytes().len(), bytes.len())?;
        trace!(index = %self.descriptor.qualified_name(), from = %old_key, to = %new_key, "primary key changed");
        tree.delete(&old_key)?;
        tree.insert(new_key, bytes)
    }

    fn missing_row(&self, key: &CompositeKey) -> CoreError {
        CoreError::invalid_operation(format!(
            "no row with primary key {key} in '{}'",
            self.descriptor.qualified_name()
        ))
    }

    /// Deletes the row with primary key `key` and returns it.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored row cannot be decoded.
    pub fn delete(&self, key: &CompositeKey) -> CoreResult<Option<Row>> {
        let bytes = self.tree.lock().delete(key)?;
        bytes
            .map(|b| Row::deserialize(&b, &self.schema))
            .transpose()
    }

    /// Returns the row with primary key `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored row cannot be decoded.
    pub fn lookup(&self, key: &CompositeKey) -> CoreResult<Option<Row>> {
        let bytes = self.tree.lock().get(key)?;
        bytes
            .map(|b| Row::deserialize(&b, &self.schema))
            .transpose()
    }

    /// Returns the version of the row with primary key `key` visible to
    /// `view`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored row cannot be decoded.
    pub fn lookup_visible(
        &self,
        key: &CompositeKey,
        view: &ReadView,
        resolver: &dyn VersionResolver,
    ) -> CoreResult<Option<Row>> {
        Ok(self
            .lookup(key)?
            .and_then(|row| resolver.find_visible_version(&row, view)))
    }

    /// Scans rows with `start <= pk <= end` in primary-key order.
    ///
    /// Missing bounds are open. A bound shorter than the primary key matches
    /// on its leading columns.
    #[must_use]
    pub fn range_scan(&self, start: Option<&CompositeKey>, end: Option<&CompositeKey>) -> RowScan {
        self.scan(
            start.map_or(Bound::Unbounded, |k| Bound::Included(k.clone())),
            end.map_or(Bound::Unbounded, |k| Bound::Included(k.clone())),
        )
    }

    /// Scans rows within arbitrary bounds in primary-key order.
    #[must_use]
    pub fn scan(&self, lower: Bound<CompositeKey>, upper: Bound<CompositeKey>) -> RowScan {
        RowScan {
            cursor: TreeCursor::new(Arc::clone(&self.tree), lower, upper),
            schema: Arc::clone(&self.schema),
        }
    }

    /// Scans like [`ClusteredIndex::range_scan`], yielding only the version
    /// of each row visible to `view` and skipping rows with none.
    #[must_use]
    pub fn range_scan_visible<'a, R: VersionResolver + ?Sized>(
        &self,
        start: Option<&CompositeKey>,
        end: Option<&CompositeKey>,
        view: &'a ReadView,
        resolver: &'a R,
    ) -> VisibleRowScan<'a, R> {
        VisibleRowScan {
            rows: self.range_scan(start, end),
            view,
            resolver,
        }
    }

    /// Returns the leaf page and slot holding the row with primary key `key`.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the descent reaches a missing page.
    pub fn locate(&self, key: &CompositeKey) -> CoreResult<Option<RowLocator>> {
        self.tree.lock().locate(key)
    }

    /// Returns the primary keys just below and just above `key`.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the leaf chain reaches a missing page.
    pub fn neighbors(
        &self,
        key: &CompositeKey,
    ) -> CoreResult<(Option<CompositeKey>, Option<CompositeKey>)> {
        self.tree.lock().neighbors(key)
    }

    /// Checks the structural invariants of the underlying tree.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` describing the first violation.
    pub fn validate(&self) -> CoreResult<()> {
        self.tree.lock().validate()
    }

    /// Returns tree counters.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        self.tree.lock().stats()
    }

    /// Flushes the page store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the flush fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.tree.lock().flush()
    }
}

impl std::fmt::Debug for ClusteredIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusteredIndex")
            .field("index", &self.descriptor.qualified_name())
            .finish_non_exhaustive()
    }
}

/// Lazy primary-key-ordered row scan.
pub struct RowScan {
    cursor: TreeCursor,
    schema: Arc<TableSchema>,
}

impl Iterator for RowScan {
    type Item = CoreResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor.next()?;
        Some(entry.and_then(|(_, bytes)| Row::deserialize(&bytes, &self.schema)))
    }
}

/// Row scan filtered through a [`VersionResolver`].
pub struct VisibleRowScan<'a, R: ?Sized> {
    rows: RowScan,
    view: &'a ReadView,
    resolver: &'a R,
}

impl<R: VersionResolver + ?Sized> Iterator for VisibleRowScan<'_, R> {
    type Item = CoreResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.rows.next()? {
                Ok(row) => {
                    if let Some(visible) = self.resolver.find_visible_version(&row, self.view) {
                        return Some(Ok(visible));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
