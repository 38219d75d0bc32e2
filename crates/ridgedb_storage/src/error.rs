//! Error types for page store operations.

use crate::page::PageId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during page store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested page was never allocated.
    #[error("page {page_id} not found: store holds {page_count} pages")]
    PageNotFound {
        /// The requested page.
        page_id: PageId,
        /// Number of pages currently allocated.
        page_count: u32,
    },

    /// A page buffer does not match the store's page size.
    #[error("page size mismatch: expected {expected} bytes, got {actual}")]
    PageSizeMismatch {
        /// The store's page size.
        expected: usize,
        /// The size of the rejected buffer.
        actual: usize,
    },

    /// The page size is too small to hold any page header.
    #[error("invalid page size {0}")]
    InvalidPageSize(usize),

    /// The storage file is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the file lock.
    #[error("page file {} is locked by another process", .0.display())]
    Locked(PathBuf),
}
