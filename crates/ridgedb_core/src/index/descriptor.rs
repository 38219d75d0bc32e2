//! Index identity and column mapping.

use crate::error::{CoreError, CoreResult};
use crate::key::CompositeKey;
use crate::schema::{Row, TableSchema};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Name of the clustered index every table has.
pub const PRIMARY_INDEX: &str = "PRIMARY";

/// Physical organization of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// B+Tree holding full rows keyed by primary key.
    Clustered,
    /// B+Tree holding `index key ++ primary key` entries.
    Secondary,
    /// Extendible hash table for equality lookups.
    Hash,
    /// Inverted token index over text columns.
    FullText,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::Clustered => "CLUSTERED",
            IndexKind::Secondary => "BTREE",
            IndexKind::Hash => "HASH",
            IndexKind::FullText => "FULLTEXT",
        };
        f.write_str(name)
    }
}

/// What an index covers and how it derives keys from rows.
///
/// Everything except the `invisible` and `descending` flags is fixed at
/// creation.
#[derive(Debug)]
pub struct IndexDescriptor {
    database: String,
    table: String,
    name: String,
    kind: IndexKind,
    columns: Vec<usize>,
    unique: bool,
    primary: bool,
    primary_key_columns: Vec<usize>,
    invisible: AtomicBool,
    descending: AtomicBool,
}

impl IndexDescriptor {
    /// Describes the clustered index of a table.
    pub fn clustered(database: impl Into<String>, schema: &TableSchema) -> Self {
        Self {
            database: database.into(),
            table: schema.name().to_string(),
            name: PRIMARY_INDEX.to_string(),
            kind: IndexKind::Clustered,
            columns: schema.primary_key().to_vec(),
            unique: true,
            primary: true,
            primary_key_columns: schema.primary_key().to_vec(),
            invisible: AtomicBool::new(false),
            descending: AtomicBool::new(false),
        }
    }

    /// Describes a derived index over the named columns.
    ///
    /// # Errors
    ///
    /// Returns `ColumnNotFound` for an unknown column, and
    /// `InvalidOperation` for an empty column list, a clustered `kind`, or a
    /// full-text index over a non-text column.
    pub fn new(
        database: impl Into<String>,
        schema: &TableSchema,
        name: impl Into<String>,
        kind: IndexKind,
        columns: &[&str],
        unique: bool,
    ) -> CoreResult<Self> {
        let name = name.into();
        if kind == IndexKind::Clustered {
            return Err(CoreError::invalid_operation(format!(
                "index '{name}' cannot be clustered; tables have exactly one clustered index"
            )));
        }
        if columns.is_empty() {
            return Err(CoreError::invalid_operation(format!(
                "index '{name}' has no columns"
            )));
        }

        let positions = schema.resolve_columns(columns, &format!("index '{name}'"))?;
        if kind == IndexKind::FullText {
            for &pos in &positions {
                if let Some(column) = schema.column(pos) {
                    if !column.data_type.is_textual() {
                        return Err(CoreError::invalid_operation(format!(
                            "full-text index '{name}' cannot cover {} column '{}'",
                            column.data_type, column.name
                        )));
                    }
                }
            }
        }

        Ok(Self {
            database: database.into(),
            table: schema.name().to_string(),
            name,
            kind,
            columns: positions,
            unique: unique && kind != IndexKind::FullText,
            primary: false,
            primary_key_columns: schema.primary_key().to_vec(),
            invisible: AtomicBool::new(false),
            descending: AtomicBool::new(false),
        })
    }

    /// Returns the database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `database.table.index`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.database, self.table, self.name)
    }

    /// Returns the index kind.
    #[must_use]
    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// Returns the indexed column positions in key order.
    #[must_use]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Returns true if the index rejects duplicate keys.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns true for the clustered primary-key index.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Returns the primary-key column positions used for lookback.
    #[must_use]
    pub fn primary_key_columns(&self) -> &[usize] {
        &self.primary_key_columns
    }

    /// Returns true if the index is hidden from the planner.
    #[must_use]
    pub fn is_invisible(&self) -> bool {
        self.invisible.load(Ordering::Acquire)
    }

    /// Hides or shows the index.
    pub fn set_invisible(&self, invisible: bool) {
        self.invisible.store(invisible, Ordering::Release);
    }

    /// Returns true if the index is declared descending.
    #[must_use]
    pub fn is_descending(&self) -> bool {
        self.descending.load(Ordering::Acquire)
    }

    /// Sets the descending flag.
    pub fn set_descending(&self, descending: bool) {
        self.descending.store(descending, Ordering::Release);
    }

    /// Builds this index's key for `row`.
    #[must_use]
    pub fn key_of(&self, row: &Row) -> CompositeKey {
        row.project(&self.columns)
    }

    /// Builds the primary key of `row`.
    #[must_use]
    pub fn primary_key_of(&self, row: &Row) -> CompositeKey {
        row.project(&self.primary_key_columns)
    }
}

impl fmt::Display for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.qualified_name())
    }
}
