//! Secondary B-Tree index.
//!
//! Leaf keys are `index key ++ primary key` with an empty payload, so two
//! rows sharing an index key still occupy distinct physical entries. A row
//! fetch through the index is a lookback: collect primary keys here, then
//! look each one up in the clustered index.

use crate::btree::{BPlusTree, TreeCursor, TreeStats};
use crate::config::IndexConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::clustered::ClusteredIndex;
use crate::index::descriptor::IndexDescriptor;
use crate::index::traits::RowIndex;
use crate::key::CompositeKey;
use crate::schema::Row;
use parking_lot::Mutex;
use ridgedb_storage::PageStore;
use std::ops::Bound;
use std::sync::Arc;

/// A non-clustered B-Tree index mapping index keys to primary keys.
pub struct SecondaryIndex {
    descriptor: Arc<IndexDescriptor>,
    tree: Arc<Mutex<BPlusTree>>,
}

impl SecondaryIndex {
    /// Opens the index in `store`, creating it if the store is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store holds something other than a B-Tree.
    pub fn open(
        descriptor: Arc<IndexDescriptor>,
        store: Box<dyn PageStore>,
        config: &IndexConfig,
    ) -> CoreResult<Self> {
        let tree = BPlusTree::open_or_create(descriptor.qualified_name(), store, config)?;
        Ok(Self {
            descriptor,
            tree: Arc::new(Mutex::new(tree)),
        })
    }

    /// Returns a shared handle to the index descriptor.
    #[must_use]
    pub fn shared_descriptor(&self) -> Arc<IndexDescriptor> {
        Arc::clone(&self.descriptor)
    }

    fn entry_key(&self, row: &Row) -> CompositeKey {
        self.descriptor
            .key_of(row)
            .concat(&self.descriptor.primary_key_of(row))
    }

    fn width(&self) -> usize {
        self.descriptor.columns().len()
    }

    fn check_unique(&self, tree: &BPlusTree, key: &CompositeKey) -> CoreResult<()> {
        if !self.descriptor.is_unique() || key.has_null() {
            return Ok(());
        }
        let probe = tree.scan_batch(Bound::Included(key), Bound::Included(key), 1)?;
        if probe.iter().any(|(k, _)| k.prefix(key.len()) == *key) {
            return Err(CoreError::constraint_violation(
                self.descriptor.qualified_name(),
                key.to_string(),
            ));
        }
        Ok(())
    }

    /// Fetches the full rows whose index key equals `values`.
    ///
    /// Primary keys that no longer resolve in `clustered` are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if either tree cannot be read.
    pub fn lookup_rows(
        &self,
        values: &CompositeKey,
        clustered: &ClusteredIndex,
    ) -> CoreResult<Vec<Row>> {
        let mut rows = Vec::new();
        for pk in self.lookup(values)? {
            if let Some(row) = clustered.lookup(&pk)? {
                rows.push(row);
            }
        }
        Ok(rows)
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
}

impl RowIndex for SecondaryIndex {
    fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    fn insert_row(&self, row: &Row) -> CoreResult<()> {
        let key = self.descriptor.key_of(row);
        let entry = self.entry_key(row);
        let mut tree = self.tree.lock();
        self.check_unique(&tree, &key)?;
        tree.insert(entry, Vec::new())
    }

    fn delete_row(&self, row: &Row) -> CoreResult<bool> {
        let entry = self.entry_key(row);
        Ok(self.tree.lock().delete(&entry)?.is_some())
    }

    fn update_row(&self, old: &Row, new: &Row) -> CoreResult<()> {
        let old_entry = self.entry_key(old);
        let new_entry = self.entry_key(new);
        if old_entry == new_entry {
            return Ok(());
        }
        let new_key = self.descriptor.key_of(new);

        let mut tree = self.tree.lock();
        tree.check_entry(new_entry.to_bytes().len(), 0)?;
        if self.descriptor.key_of(old) != new_key {
            self.check_unique(&tree, &new_key)?;
        }
        tree.delete(&old_entry)?;
        tree.insert(new_entry, Vec::new())
    }

    fn lookup(&self, key: &CompositeKey) -> CoreResult<Vec<CompositeKey>> {
        let width = self.width();
        let cursor = TreeCursor::new(
            Arc::clone(&self.tree),
            Bound::Included(key.clone()),
            Bound::Included(key.clone()),
        );
        let mut out = Vec::new();
        for entry in cursor {
            let (k, _) = entry?;
            if k.prefix(width) == *key {
                out.push(k.suffix_from(width));
            }
        }
        Ok(out)
    }

    fn range_scan(
        &self,
        start: Option<&CompositeKey>,
        end: Option<&CompositeKey>,
    ) -> CoreResult<KeyScan> {
        let cursor = TreeCursor::new(
            Arc::clone(&self.tree),
            start.map_or(Bound::Unbounded, |k| Bound::Included(k.clone())),
            end.map_or(Bound::Unbounded, |k| Bound::Included(k.clone())),
        );
        Ok(KeyScan::tree(cursor, self.width()))
    }

    fn len(&self) -> u64 {
        self.tree.lock().len()
    }

    fn flush(&self) -> CoreResult<()> {
        self.tree.lock().flush()
    }
}

impl std::fmt::Debug for SecondaryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondaryIndex")
            .field("index", &self.descriptor.qualified_name())
            .finish_non_exhaustive()
    }
}

/// Lazy sequence of primary keys produced by an index-ordered scan.
pub struct KeyScan {
    cursor: TreeCursor,
    width: usize,
}

impl KeyScan {
    fn tree(cursor: TreeCursor, width: usize) -> Self {
        Self { cursor, width }
    }
}

impl Iterator for KeyScan {
    type Item = CoreResult<CompositeKey>;

    fn next(&mut self) -> Option<Self::Item> {
        let width = self.width;
        Some(self.cursor.next()?.map(|(k, _)| k.suffix_from(width)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::descriptor::IndexKind;
    use crate::schema::{ColumnDef, TableSchema};
    use ridgedb_codec::{DataType, DataValue};
    use ridgedb_storage::InMemoryPageStore;

    fn schema() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::new(
                "users",
                vec![
                    ColumnDef::new("id", DataType::Integer),
                    ColumnDef::new("city", DataType::Text),
                    ColumnDef::new("email", DataType::Text),
                ],
                &["id"],
            )
            .unwrap(),
        )
    }

    fn config() -> IndexConfig {
        IndexConfig::new().page_size(512).capacity(4)
    }

    fn index(column: &str, unique: bool) -> SecondaryIndex {
        let d = IndexDescriptor::new("app", &schema(), format!("by_{column}"), IndexKind::Secondary, &[column], unique)
            .unwrap();
        SecondaryIndex::open(Arc::new(d), Box::new(InMemoryPageStore::new(512)), &config()).unwrap()
    }

    fn user(id: i64, city: &str, email: Option<&str>) -> Row {
        Row::new(vec![
            DataValue::Integer(id),
            DataValue::from(city),
            email.map_or(DataValue::Null, DataValue::from),
        ])
    }

    fn city(name: &str) -> CompositeKey {
        CompositeKey::from(DataValue::from(name))
    }

    #[test]
    fn non_unique_keys_share_prefix() {
        let idx = index("city", false);
        idx.insert_row(&user(1, "oslo", None)).unwrap();
        idx.insert_row(&user(2, "bergen", None)).unwrap();
        idx.insert_row(&user(3, "oslo", None)).unwrap();

        let pks = idx.lookup(&city("oslo")).unwrap();
        assert_eq!(pks, vec![CompositeKey::from(1), CompositeKey::from(3)]);
        assert!(idx.lookup(&city("trondheim")).unwrap().is_empty());
        assert_eq!(idx.len(), 3);
    }

    #[test]
    fn unique_rejects_duplicate() {
        let idx = index("email", true);
        idx.insert_row(&user(1, "oslo", Some("a@x"))).unwrap();
        let err = idx.insert_row(&user(2, "oslo", Some("a@x"))).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn unique_ignores_nulls() {
        let idx = index("email", true);
        idx.insert_row(&user(1, "oslo", None)).unwrap();
        idx.insert_row(&user(2, "oslo", None)).unwrap();
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn update_moves_entry() {
        let idx = index("city", false);
        let old = user(1, "oslo", None);
        idx.insert_row(&old).unwrap();
        idx.update_row(&old, &user(1, "bergen", None)).unwrap();
        assert!(idx.lookup(&city("oslo")).unwrap().is_empty());
        assert_eq!(idx.lookup(&city("bergen")).unwrap(), vec![CompositeKey::from(1)]);
    }

    #[test]
    fn unique_update_collision_keeps_old_entry() {
        let idx = index("email", true);
        idx.insert_row(&user(1, "oslo", Some("a@x"))).unwrap();
        let old = user(2, "oslo", Some("b@x"));
        idx.insert_row(&old).unwrap();

        let err = idx.update_row(&old, &user(2, "oslo", Some("a@x"))).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(
            idx.lookup(&CompositeKey::from(DataValue::from("b@x"))).unwrap(),
            vec![CompositeKey::from(2)]
        );
    }

    #[test]
    fn range_scan_yields_primary_keys_in_index_order() {
        let idx = index("city", false);
        for (id, c) in [(1, "c"), (2, "a"), (3, "d"), (4, "b"), (5, "c"), (6, "e")] {
            idx.insert_row(&user(id, c, None)).unwrap();
        }
        let pks: Vec<_> = idx
            .range_scan(Some(&city("b")), Some(&city("d")))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            pks,
            vec![4, 1, 5, 3].into_iter().map(CompositeKey::from).collect::<Vec<_>>()
        );
    }

    #[test]
    fn many_duplicates_span_leaves() {
        let idx = index("city", false);
        for id in 0..40 {
            idx.insert_row(&user(id, "oslo", None)).unwrap();
        }
        idx.insert_row(&user(100, "paris", None)).unwrap();
        assert_eq!(idx.lookup(&city("oslo")).unwrap().len(), 40);
        idx.validate().unwrap();
        assert!(idx.stats().splits > 0);
    }

    #[test]
    fn lookback_fetches_rows() {
        let schema = schema();
        let clustered = ClusteredIndex::open(
            Arc::new(IndexDescriptor::clustered("app", &schema)),
            Arc::clone(&schema),
            Box::new(InMemoryPageStore::new(512)),
            &config(),
        )
        .unwrap();
        let idx = index("city", false);
        for row in [user(1, "oslo", None), user(2, "rome", None), user(3, "oslo", None)] {
            clustered.insert(&row).unwrap();
            idx.insert_row(&row).unwrap();
        }

        let rows = idx.lookup_rows(&city("oslo"), &clustered).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.values()[0].clone()).collect();
        assert_eq!(ids, vec![DataValue::Integer(1), DataValue::Integer(3)]);
    }
}
