//! Error types for RidgeDB core.

use ridgedb_storage::PageId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in RidgeDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Page store error.
    #[error("storage error: {0}")]
    Storage(#[from] ridgedb_storage::StorageError),

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] ridgedb_codec::CodecError),

    /// Duplicate key on a unique or primary index.
    #[error("duplicate entry {key} for key '{index}'")]
    ConstraintViolation {
        /// Name of the index whose uniqueness was violated.
        index: String,
        /// Rendering of the offending key.
        key: String,
    },

    /// A column referenced by an index or the primary key is not in the schema.
    #[error("unknown column '{column}' in {context}")]
    ColumnNotFound {
        /// The missing column.
        column: String,
        /// Where the column was referenced.
        context: String,
    },

    /// An index with the same name already exists on the table.
    #[error("index '{index}' already exists")]
    IndexExists {
        /// Name of the index.
        index: String,
    },

    /// No index with the given name exists on the table.
    #[error("index '{index}' not found")]
    IndexNotFound {
        /// Name of the index.
        index: String,
    },

    /// A table with the same name is already registered.
    #[error("table '{table}' already exists")]
    TableExists {
        /// Qualified table name.
        table: String,
    },

    /// No table with the given name is registered.
    #[error("table '{table}' not found")]
    TableNotFound {
        /// Qualified table name.
        table: String,
    },

    /// Operation not permitted on this index or in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Page or row bytes could not be interpreted.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A single entry can never fit into one page.
    #[error("entry of {size} bytes does not fit in a page of index '{index}' (limit {limit})")]
    RecordTooLarge {
        /// Name of the index.
        index: String,
        /// Encoded size of the entry.
        size: usize,
        /// Largest entry the page layout accepts.
        limit: usize,
    },

    /// A page the tree refers to is missing or of the wrong kind.
    #[error("page {page_id} of index '{index}' is corrupted: {message}")]
    PageCorrupted {
        /// Name of the index.
        index: String,
        /// The offending page.
        page_id: PageId,
        /// Description of the corruption.
        message: String,
    },

    /// A blocking lock request was not granted in time.
    #[error("lock wait timeout exceeded on {resource}")]
    LockWaitTimeout {
        /// Rendering of the contested resource.
        resource: String,
    },
}

impl CoreError {
    /// Creates a constraint violation error.
    pub fn constraint_violation(index: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            index: index.into(),
            key: key.into(),
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(column: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
            context: context.into(),
        }
    }

    /// Creates an index exists error.
    pub fn index_exists(index: impl Into<String>) -> Self {
        Self::IndexExists {
            index: index.into(),
        }
    }

    /// Creates an index not found error.
    pub fn index_not_found(index: impl Into<String>) -> Self {
        Self::IndexNotFound {
            index: index.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a page corruption error.
    pub fn page_corrupted(
        index: impl Into<String>,
        page_id: PageId,
        message: impl Into<String>,
    ) -> Self {
        Self::PageCorrupted {
            index: index.into(),
            page_id,
            message: message.into(),
        }
    }

    /// Returns true for duplicate-key failures.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}
