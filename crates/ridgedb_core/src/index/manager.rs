//! Per-table index registry and row fan-out.
//!
//! The [`IndexManager`] owns every table's clustered index plus the derived
//! indexes declared on it. Row mutations go to the clustered index first and
//! then to each derived index in declaration order. The fan-out is not
//! atomic: if a derived index rejects a row, indexes already updated keep the
//! change and the caller is expected to roll back.
//!
//! Each table's derived-index list sits behind a read-write lock. Row
//! mutations hold it shared for their whole fan-out; `create_index` holds it
//! exclusively while it backfills, so a new index never misses or doubles a
//! row that was being written concurrently.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::clustered::{ClusteredIndex, RowScan};
use crate::index::descriptor::{IndexDescriptor, IndexKind, PRIMARY_INDEX};
use crate::index::fulltext::{FullTextIndex, TokenizerConfig};
use crate::index::hash::HashIndex;
use crate::index::secondary::{KeyScan, SecondaryIndex};
use crate::index::storage;
use crate::index::traits::RowIndex;
use crate::key::CompositeKey;
use crate::schema::{Row, TableSchema};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A `CREATE INDEX` request.
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    /// Index name, unique within the table.
    pub name: String,
    /// Physical organization; never [`IndexKind::Clustered`].
    pub kind: IndexKind,
    /// Indexed column names in key order.
    pub columns: Vec<String>,
    /// Reject duplicate keys.
    pub unique: bool,
    /// Tokenizer for full-text indexes.
    pub tokenizer: TokenizerConfig,
}

impl IndexDefinition {
    fn with_kind(name: impl Into<String>, kind: IndexKind, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind,
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            unique: false,
            tokenizer: TokenizerConfig::default(),
        }
    }

    /// A B-Tree secondary index.
    #[must_use]
    pub fn secondary(name: impl Into<String>, columns: &[&str]) -> Self {
        Self::with_kind(name, IndexKind::Secondary, columns)
    }

    /// An extendible hash index.
    #[must_use]
    pub fn hash(name: impl Into<String>, columns: &[&str]) -> Self {
        Self::with_kind(name, IndexKind::Hash, columns)
    }

    /// A full-text index.
    #[must_use]
    pub fn full_text(name: impl Into<String>, columns: &[&str]) -> Self {
        Self::with_kind(name, IndexKind::FullText, columns)
    }

    /// Marks the index UNIQUE.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the full-text tokenizer.
    #[must_use]
    pub fn tokenizer(mut self, tokenizer: TokenizerConfig) -> Self {
        self.tokenizer = tokenizer;
        self
    }
}

/// A registered non-clustered index.
#[derive(Clone)]
pub enum DerivedIndex {
    /// B-Tree secondary index.
    Secondary(Arc<SecondaryIndex>),
    /// Extendible hash index.
    Hash(Arc<HashIndex>),
    /// Full-text index.
    FullText(Arc<FullTextIndex>),
}

impl DerivedIndex {
    /// Returns the index behind its common interface.
    #[must_use]
    pub fn as_row_index(&self) -> &dyn RowIndex {
        match self {
            Self::Secondary(idx) => idx.as_ref(),
            Self::Hash(idx) => idx.as_ref(),
            Self::FullText(idx) => idx.as_ref(),
        }
    }

    /// Returns the index descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &IndexDescriptor {
        self.as_row_index().descriptor()
    }
}

impl std::fmt::Debug for DerivedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

/// The clustered index of one table and its derived indexes.
#[derive(Debug)]
pub struct TableIndexes {
    database: String,
    schema: Arc<TableSchema>,
    clustered: Arc<ClusteredIndex>,
    derived: RwLock<Vec<DerivedIndex>>,
}

impl TableIndexes {
    /// Returns the database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the table schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Returns the clustered index.
    #[must_use]
    pub fn clustered(&self) -> &Arc<ClusteredIndex> {
        &self.clustered
    }

    /// Returns the derived index called `name`.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<DerivedIndex> {
        self.derived
            .read()
            .iter()
            .find(|idx| idx.descriptor().name() == name)
            .cloned()
    }

    /// Returns every index name, `PRIMARY` first, then declaration order.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        std::iter::once(PRIMARY_INDEX.to_string())
            .chain(
                self.derived
                    .read()
                    .iter()
                    .map(|idx| idx.descriptor().name().to_string()),
            )
            .collect()
    }

    fn has_index(derived: &[DerivedIndex], name: &str) -> bool {
        name == PRIMARY_INDEX || derived.iter().any(|idx| idx.descriptor().name() == name)
    }
}

/// Registry of tables and their indexes.
///
/// Constructed explicitly and owned by the caller; nothing here is global.
#[derive(Debug)]
pub struct IndexManager {
    config: Config,
    tables: RwLock<HashMap<(String, String), Arc<TableIndexes>>>,
}

impl IndexManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers a table and opens its clustered index.
    ///
    /// With directory storage an existing `PRIMARY` page file is reattached,
    /// so rows written by an earlier manager are visible again.
    ///
    /// # Errors
    ///
    /// Returns `TableExists` if the table is already registered, or a
    /// storage error if the page store cannot be opened.
    pub fn create_table(
        &self,
        database: &str,
        schema: TableSchema,
    ) -> CoreResult<Arc<TableIndexes>> {
        let key = (database.to_string(), schema.name().to_string());
        let mut tables = self.tables.write();
        if tables.contains_key(&key) {
            return Err(CoreError::TableExists {
                table: format!("{database}.{}", schema.name()),
            });
        }

        let schema = Arc::new(schema);
        let descriptor = Arc::new(IndexDescriptor::clustered(database, &schema));
        let store = storage::open_store(
            &self.config.storage,
            &self.config.index,
            database,
            schema.name(),
            PRIMARY_INDEX,
        )?;
        let clustered = ClusteredIndex::open(
            descriptor,
            Arc::clone(&schema),
            store,
            &self.config.index,
        )?;
        debug!(database, table = schema.name(), rows = clustered.len(), "created table");

        let table = Arc::new(TableIndexes {
            database: database.to_string(),
            schema,
            clustered: Arc::new(clustered),
            derived: RwLock::new(Vec::new()),
        });
        tables.insert(key, Arc::clone(&table));
        Ok(table)
    }

    /// Unregisters a table and removes the page files of all its indexes.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` for an unknown table.
    pub fn drop_table(&self, database: &str, table: &str) -> CoreResult<()> {
        let removed = self
            .tables
            .write()
            .remove(&(database.to_string(), table.to_string()))
            .ok_or_else(|| CoreError::TableNotFound {
                table: format!("{database}.{table}"),
            })?;

        let names = removed.index_names();
        drop(removed);
        for name in names {
            storage::discard_store(&self.config.storage, database, table, &name)?;
        }
        debug!(database, table, "dropped table");
        Ok(())
    }

    /// Returns a registered table.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` for an unknown table.
    pub fn table(&self, database: &str, table: &str) -> CoreResult<Arc<TableIndexes>> {
        self.tables
            .read()
            .get(&(database.to_string(), table.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::TableNotFound {
                table: format!("{database}.{table}"),
            })
    }

    /// Returns the registered tables of `database`, sorted.
    #[must_use]
    pub fn table_names(&self, database: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .keys()
            .filter(|(db, _)| db == database)
            .map(|(_, table)| table.clone())
            .collect();
        names.sort();
        names
    }

    /// Creates an index, fills it from the table's rows, and registers it.
    ///
    /// The index is registered only if every existing row was accepted; a
    /// UNIQUE index over duplicate data is discarded and the error returned.
    ///
    /// # Errors
    ///
    /// Returns `IndexExists`, `ColumnNotFound`, `InvalidOperation` for an
    /// invalid definition, or `ConstraintViolation` from the backfill.
    pub fn create_index(
        &self,
        database: &str,
        table: &str,
        definition: &IndexDefinition,
    ) -> CoreResult<()> {
        let entry = self.table(database, table)?;
        let mut derived = entry.derived.write();
        if TableIndexes::has_index(&derived, &definition.name) {
            return Err(CoreError::index_exists(format!(
                "{database}.{table}.{}",
                definition.name
            )));
        }

        let columns: Vec<&str> = definition.columns.iter().map(String::as_str).collect();
        let descriptor = Arc::new(IndexDescriptor::new(
            database,
            &entry.schema,
            definition.name.clone(),
            definition.kind,
            &columns,
            definition.unique,
        )?);

        let index = self.build_index(database, table, descriptor, definition)?;
        if let Err(e) = Self::backfill(&entry.clustered, &index) {
            drop(index);
            storage::discard_store(&self.config.storage, database, table, &definition.name)?;
            debug!(database, table, index = %definition.name, error = %e, "index backfill failed");
            return Err(e);
        }

        debug!(
            database,
            table,
            index = %definition.name,
            kind = %definition.kind,
            entries = index.as_row_index().len(),
            "created index"
        );
        derived.push(index);
        Ok(())
    }

    fn build_index(
        &self,
        database: &str,
        table: &str,
        descriptor: Arc<IndexDescriptor>,
        definition: &IndexDefinition,
    ) -> CoreResult<DerivedIndex> {
        let open_fresh = || -> CoreResult<_> {
            storage::discard_store(&self.config.storage, database, table, &definition.name)?;
            storage::open_store(
                &self.config.storage,
                &self.config.index,
                database,
                table,
                &definition.name,
            )
        };
        Ok(match definition.kind {
            IndexKind::Secondary => DerivedIndex::Secondary(Arc::new(SecondaryIndex::open(
                descriptor,
                open_fresh()?,
                &self.config.index,
            )?)),
            IndexKind::Hash => DerivedIndex::Hash(Arc::new(HashIndex::open(
                descriptor,
                open_fresh()?,
                &self.config.index,
            )?)),
            IndexKind::FullText => DerivedIndex::FullText(Arc::new(FullTextIndex::new(
                descriptor,
                definition.tokenizer.clone(),
            ))),
            IndexKind::Clustered => {
                return Err(CoreError::invalid_operation(
                    "a table has exactly one clustered index",
                ))
            }
        })
    }

    fn backfill(clustered: &ClusteredIndex, index: &DerivedIndex) -> CoreResult<()> {
        let target = index.as_row_index();
        for row in clustered.range_scan(None, None) {
            target.insert_row(&row?)?;
        }
        Ok(())
    }

    /// Unregisters a derived index and removes its page file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for `PRIMARY` and `IndexNotFound` for an
    /// unknown index.
    pub fn drop_index(&self, database: &str, table: &str, index: &str) -> CoreResult<()> {
        if index == PRIMARY_INDEX {
            return Err(CoreError::invalid_operation(format!(
                "cannot drop the clustered index of {database}.{table}"
            )));
        }
        let entry = self.table(database, table)?;
        {
            let mut derived = entry.derived.write();
            let position = derived
                .iter()
                .position(|idx| idx.descriptor().name() == index)
                .ok_or_else(|| CoreError::index_not_found(format!("{database}.{table}.{index}")))?;
            derived.remove(position);
        }
        storage::discard_store(&self.config.storage, database, table, index)?;
        debug!(database, table, index, "dropped index");
        Ok(())
    }

    /// Returns the descriptor of any index on the table, `PRIMARY` included.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` or `IndexNotFound`.
    pub fn descriptor(
        &self,
        database: &str,
        table: &str,
        index: &str,
    ) -> CoreResult<Arc<IndexDescriptor>> {
        let entry = self.table(database, table)?;
        if index == PRIMARY_INDEX {
            return Ok(Arc::clone(entry.clustered.descriptor()));
        }
        let derived = entry
            .index(index)
            .ok_or_else(|| CoreError::index_not_found(format!("{database}.{table}.{index}")))?;
        let descriptor = match &derived {
            DerivedIndex::Secondary(idx) => idx.shared_descriptor(),
            DerivedIndex::Hash(idx) => idx.shared_descriptor(),
            DerivedIndex::FullText(idx) => idx.shared_descriptor(),
        };
        Ok(descriptor)
    }

    /// Hides or shows an index.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` or `IndexNotFound`.
    pub fn set_index_visibility(
        &self,
        database: &str,
        table: &str,
        index: &str,
        visible: bool,
    ) -> CoreResult<()> {
        self.descriptor(database, table, index)?
            .set_invisible(!visible);
        Ok(())
    }

    /// Sets an index's descending flag.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` or `IndexNotFound`.
    pub fn set_index_descending(
        &self,
        database: &str,
        table: &str,
        index: &str,
        descending: bool,
    ) -> CoreResult<()> {
        self.descriptor(database, table, index)?
            .set_descending(descending);
        Ok(())
    }

    /// Returns the index names of a table, `PRIMARY` first.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` for an unknown table.
    pub fn index_names(&self, database: &str, table: &str) -> CoreResult<Vec<String>> {
        Ok(self.table(database, table)?.index_names())
    }

    /// Inserts a row into the clustered index and every derived index.
    ///
    /// If a derived index rejects the row, the indexes already updated are
    /// rolled back, so a failed insert leaves the table unchanged.
    ///
    /// # Errors
    ///
    /// Returns the first error from any index.
    pub fn insert_row(&self, database: &str, table: &str, row: &Row) -> CoreResult<()> {
        let entry = self.table(database, table)?;
        let derived = entry.derived.read();
        entry.clustered.insert(row)?;
        for (done, idx) in derived.iter().enumerate() {
            if let Err(e) = idx.as_row_index().insert_row(row) {
                warn!(index = %idx.descriptor().qualified_name(), error = %e, "rolling back row insert");
                for undo in derived[..done].iter().rev() {
                    undo.as_row_index().delete_row(row)?;
                }
                entry
                    .clustered
                    .delete(&row.primary_key(entry.clustered.schema()))?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Replaces `old` with `new` in every index.
    ///
    /// If a derived index rejects the change, the indexes already updated
    /// are restored to `old`.
    ///
    /// # Errors
    ///
    /// Returns the first error from any index.
    pub fn update_row(&self, database: &str, table: &str, old: &Row, new: &Row) -> CoreResult<()> {
        let entry = self.table(database, table)?;
        let derived = entry.derived.read();
        entry.clustered.update(old, new)?;
        for (done, idx) in derived.iter().enumerate() {
            if let Err(e) = idx.as_row_index().update_row(old, new) {
                warn!(index = %idx.descriptor().qualified_name(), error = %e, "rolling back row update");
                for undo in derived[..done].iter().rev() {
                    undo.as_row_index().update_row(new, old)?;
                }
                entry.clustered.update(new, old)?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Deletes the row with primary key `pk` from every index.
    ///
    /// Returns the deleted row, or `None` if no row had that key.
    ///
    /// # Errors
    ///
    /// Returns the first error from any index.
    pub fn delete_row(
        &self,
        database: &str,
        table: &str,
        pk: &CompositeKey,
    ) -> CoreResult<Option<Row>> {
        let entry = self.table(database, table)?;
        let derived = entry.derived.read();
        let Some(row) = entry.clustered.delete(pk)? else {
            return Ok(None);
        };
        for idx in derived.iter() {
            idx.as_row_index().delete_row(&row)?;
        }
        Ok(Some(row))
    }

    /// Fetches the rows whose key in `index` equals `key`.
    ///
    /// Derived indexes resolve to primary keys, which are then looked up in
    /// the clustered index.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound`, `IndexNotFound`, or a read error.
    pub fn lookup(
        &self,
        database: &str,
        table: &str,
        index: &str,
        key: &CompositeKey,
    ) -> CoreResult<Vec<Row>> {
        let entry = self.table(database, table)?;
        if index == PRIMARY_INDEX {
            return Ok(entry.clustered.lookup(key)?.into_iter().collect());
        }
        let derived = entry
            .index(index)
            .ok_or_else(|| CoreError::index_not_found(format!("{database}.{table}.{index}")))?;
        let mut rows = Vec::new();
        for pk in derived.as_row_index().lookup(key)? {
            if let Some(row) = entry.clustered.lookup(&pk)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Scans rows with `start <= key <= end` in `index` order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for hash and full-text indexes, and
    /// `TableNotFound` or `IndexNotFound` for unknown names.
    pub fn range_scan(
        &self,
        database: &str,
        table: &str,
        index: &str,
        start: Option<&CompositeKey>,
        end: Option<&CompositeKey>,
    ) -> CoreResult<IndexScan> {
        let entry = self.table(database, table)?;
        if index == PRIMARY_INDEX {
            return Ok(IndexScan {
                source: ScanSource::Clustered(entry.clustered.range_scan(start, end)),
            });
        }
        let derived = entry
            .index(index)
            .ok_or_else(|| CoreError::index_not_found(format!("{database}.{table}.{index}")))?;
        let keys = derived.as_row_index().range_scan(start, end)?;
        Ok(IndexScan {
            source: ScanSource::Lookback {
                keys,
                clustered: Arc::clone(&entry.clustered),
            },
        })
    }

    /// Flushes every index page store.
    ///
    /// # Errors
    ///
    /// Returns the first flush error.
    pub fn flush(&self) -> CoreResult<()> {
        let tables: Vec<_> = self.tables.read().values().cloned().collect();
        for table in tables {
            table.clustered.flush()?;
            for idx in table.derived.read().iter() {
                idx.as_row_index().flush()?;
            }
        }
        Ok(())
    }
}

enum ScanSource {
    Clustered(RowScan),
    Lookback {
        keys: KeyScan,
        clustered: Arc<ClusteredIndex>,
    },
}

/// Lazy row scan through any ordered index.
pub struct IndexScan {
    source: ScanSource,
}

impl Iterator for IndexScan {
    type Item = CoreResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            ScanSource::Clustered(rows) => rows.next(),
            ScanSource::Lookback { keys, clustered } => loop {
                let pk = match keys.next()? {
                    Ok(pk) => pk,
                    Err(e) => return Some(Err(e)),
                };
                match clustered.lookup(&pk) {
                    Ok(Some(row)) => return Some(Ok(row)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::schema::ColumnDef;
    use ridgedb_codec::{DataType, DataValue};

    fn manager() -> IndexManager {
        IndexManager::new(Config::new().index(IndexConfig::new().page_size(512).capacity(4)))
    }

    fn orders() -> TableSchema {
        TableSchema::new(
            "orders",
            vec![
                ColumnDef::new("id", DataType::Integer),
                ColumnDef::new("customer", DataType::Text),
                ColumnDef::new("note", DataType::Text),
            ],
            &["id"],
        )
        .unwrap()
    }

    fn order(id: i64, customer: &str, note: &str) -> Row {
        Row::new(vec![DataValue::Integer(id), DataValue::from(customer), DataValue::from(note)])
    }

    fn text(s: &str) -> CompositeKey {
        CompositeKey::from(DataValue::from(s))
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().map(|r| r.values()[0].as_integer().unwrap()).collect()
    }

    fn seeded() -> IndexManager {
        let m = manager();
        m.create_table("shop", orders()).unwrap();
        m.create_index("shop", "orders", &IndexDefinition::secondary("by_customer", &["customer"]))
            .unwrap();
        m.create_index("shop", "orders", &IndexDefinition::hash("customer_hash", &["customer"]))
            .unwrap();
        m.create_index("shop", "orders", &IndexDefinition::full_text("note_ft", &["note"]))
            .unwrap();
        for (id, customer, note) in [
            (1, "ann", "red chair"),
            (2, "bob", "blue table"),
            (3, "ann", "blue chair"),
            (4, "cat", "green lamp"),
        ] {
            m.insert_row("shop", "orders", &order(id, customer, note)).unwrap();
        }
        m
    }

    #[test]
    fn duplicate_table_rejected() {
        let m = manager();
        m.create_table("shop", orders()).unwrap();
        let err = m.create_table("shop", orders()).unwrap_err();
        assert!(matches!(err, CoreError::TableExists { .. }));
        assert_eq!(m.table_names("shop"), vec!["orders"]);
    }

    #[test]
    fn fan_out_reaches_every_index() {
        let m = seeded();
        assert_eq!(
            m.index_names("shop", "orders").unwrap(),
            vec!["PRIMARY", "by_customer", "customer_hash", "note_ft"]
        );
        assert_eq!(ids(&m.lookup("shop", "orders", "by_customer", &text("ann")).unwrap()), vec![1, 3]);
        let mut by_hash = ids(&m.lookup("shop", "orders", "customer_hash", &text("ann")).unwrap());
        by_hash.sort_unstable();
        assert_eq!(by_hash, vec![1, 3]);
        assert_eq!(ids(&m.lookup("shop", "orders", "note_ft", &text("blue")).unwrap()), vec![2, 3]);
        assert_eq!(ids(&m.lookup("shop", "orders", "PRIMARY", &CompositeKey::from(4)).unwrap()), vec![4]);
    }

    #[test]
    fn update_and_delete_fan_out() {
        let m = seeded();
        m.update_row("shop", "orders", &order(1, "ann", "red chair"), &order(1, "dan", "red sofa"))
            .unwrap();
        assert_eq!(ids(&m.lookup("shop", "orders", "by_customer", &text("ann")).unwrap()), vec![3]);
        assert_eq!(ids(&m.lookup("shop", "orders", "customer_hash", &text("dan")).unwrap()), vec![1]);
        assert_eq!(ids(&m.lookup("shop", "orders", "note_ft", &text("sofa")).unwrap()), vec![1]);

        let removed = m.delete_row("shop", "orders", &CompositeKey::from(3)).unwrap();
        assert_eq!(removed, Some(order(3, "ann", "blue chair")));
        assert!(m.lookup("shop", "orders", "by_customer", &text("ann")).unwrap().is_empty());
        assert!(m.lookup("shop", "orders", "customer_hash", &text("ann")).unwrap().is_empty());
        assert_eq!(ids(&m.lookup("shop", "orders", "note_ft", &text("blue")).unwrap()), vec![2]);
        assert_eq!(m.delete_row("shop", "orders", &CompositeKey::from(3)).unwrap(), None);
    }

    #[test]
    fn range_scan_dispatches() {
        let m = seeded();
        let rows: Vec<_> = m
            .range_scan("shop", "orders", "by_customer", Some(&text("b")), None)
            .unwrap()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(ids(&rows), vec![2, 4]);

        let rows: Vec<_> = m
            .range_scan("shop", "orders", "PRIMARY", Some(&CompositeKey::from(2)), Some(&CompositeKey::from(3)))
            .unwrap()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(ids(&rows), vec![2, 3]);

        let err = m.range_scan("shop", "orders", "customer_hash", None, None).err().unwrap();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn duplicate_key_names_index() {
        let m = seeded();
        let err = m.insert_row("shop", "orders", &order(1, "zed", "")).unwrap_err();
        match err {
            CoreError::ConstraintViolation { index, .. } => assert_eq!(index, "shop.orders.PRIMARY"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn rejected_insert_rolls_back_every_index() {
        let m = seeded();
        m.create_index("shop", "orders", &IndexDefinition::hash("uq_note", &["note"]).unique())
            .unwrap();

        let err = m.insert_row("shop", "orders", &order(7, "ann", "green lamp")).unwrap_err();
        assert!(err.is_constraint_violation());
        assert!(m.lookup("shop", "orders", "PRIMARY", &CompositeKey::from(7)).unwrap().is_empty());
        assert_eq!(ids(&m.lookup("shop", "orders", "by_customer", &text("ann")).unwrap()), vec![1, 3]);
        let mut by_hash = ids(&m.lookup("shop", "orders", "customer_hash", &text("ann")).unwrap());
        by_hash.sort_unstable();
        assert_eq!(by_hash, vec![1, 3]);
        assert_eq!(ids(&m.lookup("shop", "orders", "note_ft", &text("lamp")).unwrap()), vec![4]);

        let table = m.table("shop", "orders").unwrap();
        assert_eq!(table.clustered().len(), 4);
        table.clustered().validate().unwrap();
        m.insert_row("shop", "orders", &order(7, "ann", "grey lamp")).unwrap();
    }

    #[test]
    fn rejected_update_restores_old_row() {
        let m = seeded();
        m.create_index("shop", "orders", &IndexDefinition::secondary("uq_note", &["note"]).unique())
            .unwrap();

        let err = m
            .update_row("shop", "orders", &order(2, "bob", "blue table"), &order(2, "eve", "red chair"))
            .unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(
            m.lookup("shop", "orders", "PRIMARY", &CompositeKey::from(2)).unwrap(),
            vec![order(2, "bob", "blue table")]
        );
        assert_eq!(ids(&m.lookup("shop", "orders", "by_customer", &text("bob")).unwrap()), vec![2]);
        assert!(m.lookup("shop", "orders", "customer_hash", &text("eve")).unwrap().is_empty());
        assert_eq!(ids(&m.lookup("shop", "orders", "note_ft", &text("table")).unwrap()), vec![2]);
    }

    #[test]
    fn unique_backfill_failure_leaves_index_unregistered() {
        let m = seeded();
        let err = m
            .create_index("shop", "orders", &IndexDefinition::secondary("uq_customer", &["customer"]).unique())
            .unwrap_err();
        assert!(err.is_constraint_violation());
        assert!(!m.index_names("shop", "orders").unwrap().contains(&"uq_customer".to_string()));

        m.insert_row("shop", "orders", &order(9, "ann", "")).unwrap();
    }

    #[test]
    fn administrative_errors() {
        let m = seeded();
        let dup = IndexDefinition::secondary("by_customer", &["note"]);
        assert!(matches!(
            m.create_index("shop", "orders", &dup).unwrap_err(),
            CoreError::IndexExists { .. }
        ));
        assert!(matches!(
            m.create_index("shop", "orders", &IndexDefinition::secondary("x", &["nope"])).unwrap_err(),
            CoreError::ColumnNotFound { .. }
        ));
        assert!(matches!(
            m.create_index("shop", "orders", &IndexDefinition::full_text("ft_id", &["id"])).unwrap_err(),
            CoreError::InvalidOperation { .. }
        ));
        assert!(matches!(
            m.drop_index("shop", "orders", "PRIMARY").unwrap_err(),
            CoreError::InvalidOperation { .. }
        ));
        assert!(matches!(
            m.drop_index("shop", "orders", "missing").unwrap_err(),
            CoreError::IndexNotFound { .. }
        ));
        assert!(matches!(
            m.table("shop", "nope").unwrap_err(),
            CoreError::TableNotFound { .. }
        ));
    }

    #[test]
    fn drop_index_stops_maintenance() {
        let m = seeded();
        m.drop_index("shop", "orders", "customer_hash").unwrap();
        assert!(matches!(
            m.lookup("shop", "orders", "customer_hash", &text("ann")).unwrap_err(),
            CoreError::IndexNotFound { .. }
        ));
        m.insert_row("shop", "orders", &order(5, "eve", "")).unwrap();
        m.create_index("shop", "orders", &IndexDefinition::hash("customer_hash", &["customer"]))
            .unwrap();
        assert_eq!(ids(&m.lookup("shop", "orders", "customer_hash", &text("eve")).unwrap()), vec![5]);
    }

    #[test]
    fn alter_flags_toggle() {
        let m = seeded();
        m.set_index_visibility("shop", "orders", "by_customer", false).unwrap();
        m.set_index_descending("shop", "orders", "PRIMARY", true).unwrap();
        assert!(m.descriptor("shop", "orders", "by_customer").unwrap().is_invisible());
        assert!(m.descriptor("shop", "orders", "PRIMARY").unwrap().is_descending());
        m.set_index_visibility("shop", "orders", "by_customer", true).unwrap();
        assert!(!m.descriptor("shop", "orders", "by_customer").unwrap().is_invisible());
    }

    #[test]
    fn drop_table_unregisters() {
        let m = seeded();
        m.drop_table("shop", "orders").unwrap();
        assert!(m.table("shop", "orders").is_err());
        assert!(m.drop_table("shop", "orders").is_err());
        m.create_table("shop", orders()).unwrap();
        assert!(m.table("shop", "orders").unwrap().clustered().is_empty());
    }
}
