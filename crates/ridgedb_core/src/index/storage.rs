//! Page store placement for indexes.

use crate::config::{IndexConfig, StorageConfig};
use crate::error::CoreResult;
use ridgedb_storage::{FilePageStore, InMemoryPageStore, PageStore};
use std::path::{Path, PathBuf};

/// File extension of index page files.
pub const INDEX_FILE_EXTENSION: &str = "idx";

/// Returns `<dir>/<database>/<table>/<index>.idx`.
#[must_use]
pub fn index_path(dir: &Path, database: &str, table: &str, index: &str) -> PathBuf {
    dir.join(database)
        .join(table)
        .join(format!("{index}.{INDEX_FILE_EXTENSION}"))
}

/// Opens the page store of one index, creating it if absent.
///
/// # Errors
///
/// Returns a storage error if the file cannot be opened or is locked.
pub fn open_store(
    storage: &StorageConfig,
    config: &IndexConfig,
    database: &str,
    table: &str,
    index: &str,
) -> CoreResult<Box<dyn PageStore>> {
    Ok(match storage {
        StorageConfig::InMemory => Box::new(InMemoryPageStore::new(config.page_size)),
        StorageConfig::Directory(dir) => Box::new(FilePageStore::open_with_create_dirs(
            &index_path(dir, database, table, index),
            config.page_size,
        )?),
    })
}

/// Removes the page file of one index, if any.
///
/// # Errors
///
/// Returns an I/O error if an existing file cannot be removed.
pub fn discard_store(
    storage: &StorageConfig,
    database: &str,
    table: &str,
    index: &str,
) -> CoreResult<()> {
    if let StorageConfig::Directory(dir) = storage {
        let path = index_path(dir, database, table, index);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ridgedb_storage::StorageError::from(e).into()),
        }
    }
    Ok(())
}
