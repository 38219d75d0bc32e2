//! Test fixtures and index manager helpers.
//!
//! Provides convenience functions for setting up index managers and the
//! `users` table most tests work against.

use ridgedb_codec::{DataType, DataValue};
use ridgedb_core::{ColumnDef, Config, IndexConfig, IndexManager, Row, StorageConfig, TableSchema};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Database name used by the fixtures.
pub const TEST_DATABASE: &str = "app";

/// An index manager with automatic cleanup.
pub struct TestManager {
    /// The manager instance.
    pub manager: IndexManager,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestManager {
    /// Creates a manager whose indexes live in memory.
    pub fn memory() -> Self {
        Self::with_config(Config::new())
    }

    /// Creates an in-memory manager with tiny pages, so a handful of rows
    /// already forces splits.
    pub fn small_pages() -> Self {
        Self::with_config(Config::new().index(small_index_config()))
    }

    /// Creates a manager with the given configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            manager: IndexManager::new(config),
            temp_dir: None,
        }
    }

    /// Creates a manager whose indexes live in a fresh temporary directory.
    pub fn directory() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config::new()
            .storage(StorageConfig::Directory(temp_dir.path().to_path_buf()))
            .index(small_index_config());
        Self {
            manager: IndexManager::new(config),
            temp_dir: Some(temp_dir),
        }
    }

    /// Replaces the manager with a fresh one over the same directory, as
    /// after a restart. Tables must be created again to reattach their
    /// page files.
    ///
    /// # Panics
    ///
    /// Panics if this manager is in-memory.
    pub fn restart(&mut self) {
        let path = self
            .path()
            .expect("restart requires directory storage")
            .to_path_buf();
        self.manager = IndexManager::new(
            Config::new()
                .storage(StorageConfig::Directory(path))
                .index(small_index_config()),
        );
    }

    /// Returns the storage directory if directory-backed, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Returns the page file of `index` on `table`, if directory-backed.
    pub fn index_file(&self, table: &str, index: &str) -> Option<PathBuf> {
        self.path()
            .map(|dir| ridgedb_core::index::index_path(dir, TEST_DATABASE, table, index))
    }
}

impl std::ops::Deref for TestManager {
    type Target = IndexManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

/// Index sizing that splits after four entries per page.
pub fn small_index_config() -> IndexConfig {
    IndexConfig::new()
        .page_size(512)
        .capacity(4)
        .bucket_capacity(4)
        .max_global_depth(8)
}

/// `users(id INTEGER NOT NULL, name TEXT, city TEXT, email TEXT)` keyed by
/// `id`.
pub fn users_schema() -> TableSchema {
    TableSchema::new(
        "users",
        vec![
            ColumnDef::new("id", DataType::Integer).not_null(),
            ColumnDef::new("name", DataType::Text),
            ColumnDef::new("city", DataType::Text),
            ColumnDef::new("email", DataType::Text),
        ],
        &["id"],
    )
    .expect("users schema is valid")
}

/// A row of [`users_schema`].
pub fn user_row(id: i64, name: &str, city: &str, email: Option<&str>) -> Row {
    Row::new(vec![
        DataValue::Integer(id),
        DataValue::from(name),
        DataValue::from(city),
        email.map_or(DataValue::Null, DataValue::from),
    ])
}

/// `order_lines(order_id INTEGER, line INTEGER, sku TEXT, qty INTEGER)`
/// keyed by `(order_id, line)`.
pub fn order_lines_schema() -> TableSchema {
    TableSchema::new(
        "order_lines",
        vec![
            ColumnDef::new("order_id", DataType::Integer).not_null(),
            ColumnDef::new("line", DataType::Integer).not_null(),
            ColumnDef::new("sku", DataType::Text),
            ColumnDef::new("qty", DataType::Integer),
        ],
        &["order_id", "line"],
    )
    .expect("order_lines schema is valid")
}

/// A row of [`order_lines_schema`].
pub fn order_line_row(order_id: i64, line: i64, sku: &str, qty: i64) -> Row {
    Row::new(vec![
        DataValue::Integer(order_id),
        DataValue::Integer(line),
        DataValue::from(sku),
        DataValue::Integer(qty),
    ])
}

/// Creates the `users` table on `manager` and inserts `count` rows with ids
/// `1..=count`, spread over three cities.
pub fn populate_users(manager: &IndexManager, count: i64) {
    const CITIES: [&str; 3] = ["oslo", "bergen", "tromso"];

    manager
        .create_table(TEST_DATABASE, users_schema())
        .expect("Failed to create users table");
    for id in 1..=count {
        let city = CITIES[(id as usize) % CITIES.len()];
        let email = format!("user{id}@example.com");
        manager
            .insert_row(
                TEST_DATABASE,
                "users",
                &user_row(id, &format!("user{id}"), city, Some(&email)),
            )
            .expect("Failed to insert user");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_manager_has_no_path() {
        let m = TestManager::memory();
        assert!(m.path().is_none());
        assert!(m.index_file("users", "PRIMARY").is_none());
    }

    #[test]
    fn populate_users_inserts_rows() {
        let m = TestManager::small_pages();
        populate_users(&m, 10);
        let table = m.table(TEST_DATABASE, "users").unwrap();
        assert_eq!(table.clustered().len(), 10);
    }

    #[test]
    fn user_row_matches_schema() {
        let schema = users_schema();
        user_row(1, "ada", "oslo", None).validate(&schema).unwrap();
        order_line_row(1, 2, "sku-1", 3)
            .validate(&order_lines_schema())
            .unwrap();
    }
}
