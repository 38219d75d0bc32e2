//! Table schemas and rows.
//!
//! A [`TableSchema`] is the ordered column list of a table together with the
//! resolved positions of its primary-key columns. A [`Row`] is one ordered
//! tuple of values conforming to a schema; its byte form is a single encoded
//! value sequence, which is what the clustered index stores in its leaves.

use crate::error::{CoreError, CoreResult};
use crate::key::CompositeKey;
use ridgedb_codec::{decode_values, encode_values, DataType, DataValue};

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub data_type: DataType,
    /// Whether the column accepts `NULL`.
    pub nullable: bool,
}

impl ColumnDef {
    /// Creates a nullable column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    /// Marks the column `NOT NULL`.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered columns of a table plus its primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<usize>,
}

impl TableSchema {
    /// Creates a schema, resolving the primary-key columns by name.
    ///
    /// Primary-key columns are implicitly `NOT NULL`.
    ///
    /// # Errors
    ///
    /// Returns `ColumnNotFound` if a primary-key column is not declared, and
    /// `InvalidOperation` for an empty primary key or duplicate column names.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<ColumnDef>,
        primary_key: &[&str],
    ) -> CoreResult<Self> {
        let name = name.into();
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(CoreError::invalid_operation(format!(
                    "duplicate column '{}' in table '{name}'",
                    column.name
                )));
            }
        }
        if primary_key.is_empty() {
            return Err(CoreError::invalid_operation(format!(
                "table '{name}' has no primary key"
            )));
        }

        let mut schema = Self {
            name,
            columns,
            primary_key: Vec::new(),
        };
        let context = format!("primary key of '{}'", schema.name);
        schema.primary_key = schema.resolve_columns(primary_key, &context)?;
        for &pos in &schema.primary_key {
            schema.columns[pos].nullable = false;
        }
        Ok(schema)
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Returns the column at `position`.
    #[must_use]
    pub fn column(&self, position: usize) -> Option<&ColumnDef> {
        self.columns.get(position)
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns the position of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Resolves column names to positions.
    ///
    /// # Errors
    ///
    /// Returns `ColumnNotFound` naming the first unknown column, with
    /// `context` describing the reference.
    pub fn resolve_columns(&self, names: &[&str], context: &str) -> CoreResult<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| CoreError::column_not_found(*name, context))
            })
            .collect()
    }

    /// Returns the primary-key column positions.
    #[must_use]
    pub fn primary_key(&self) -> &[usize] {
        &self.primary_key
    }
}

/// One row of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row {
    values: Vec<DataValue>,
}

impl Row {
    /// Creates a row from its column values.
    #[must_use]
    pub fn new(values: Vec<DataValue>) -> Self {
        Self { values }
    }

    /// Returns the column values.
    #[must_use]
    pub fn values(&self) -> &[DataValue] {
        &self.values
    }

    /// Returns the value at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&DataValue> {
        self.values.get(position)
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true for a zero-column row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Builds a key from the values at `positions`.
    ///
    /// Positions past the end of the row yield `NULL`.
    #[must_use]
    pub fn project(&self, positions: &[usize]) -> CompositeKey {
        CompositeKey::new(
            positions
                .iter()
                .map(|&p| self.values.get(p).cloned().unwrap_or(DataValue::Null))
                .collect(),
        )
    }

    /// Builds the primary key of this row.
    #[must_use]
    pub fn primary_key(&self, schema: &TableSchema) -> CompositeKey {
        self.project(schema.primary_key())
    }

    /// Checks arity, types and nullability against a schema.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` describing the first mismatch.
    pub fn validate(&self, schema: &TableSchema) -> CoreResult<()> {
        if self.values.len() != schema.column_count() {
            return Err(CoreError::invalid_format(format!(
                "row has {} values but table '{}' has {} columns",
                self.values.len(),
                schema.name(),
                schema.column_count()
            )));
        }
        for (value, column) in self.values.iter().zip(schema.columns()) {
            match value.data_type() {
                None if !column.nullable => {
                    return Err(CoreError::invalid_format(format!(
                        "column '{}' cannot be NULL",
                        column.name
                    )));
                }
                Some(actual) if actual != column.data_type => {
                    return Err(CoreError::invalid_format(format!(
                        "column '{}' expects {} but got {actual}",
                        column.name, column.data_type
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Serializes the row.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        encode_values(&self.values)
    }

    /// Deserializes a row and checks it against `schema`.
    ///
    /// # Errors
    ///
    /// Returns a codec error for malformed bytes and `InvalidFormat` if the
    /// decoded values do not conform to the schema.
    pub fn deserialize(bytes: &[u8], schema: &TableSchema) -> CoreResult<Self> {
        let row = Self::new(decode_values(bytes)?);
        row.validate(schema)?;
        Ok(row)
    }
}

impl From<Vec<DataValue>> for Row {
    fn from(values: Vec<DataValue>) -> Self {
        Self::new(values)
    }
}
