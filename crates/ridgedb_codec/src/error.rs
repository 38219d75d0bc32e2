//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to decode bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Invalid structure.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// The input uses a CBOR construct outside the supported subset.
    #[error("unsupported CBOR item: {item}")]
    UnsupportedType {
        /// Name of the unsupported item.
        item: String,
    },

    /// A length prefix exceeds the decoder's limits.
    #[error("size limit exceeded: claimed {claimed}, max allowed {max_allowed}")]
    SizeLimitExceeded {
        /// Size claimed by the input.
        claimed: u64,
        /// Maximum size accepted.
        max_allowed: u64,
    },

    /// Bytes remain after a complete value was decoded.
    #[error("{remaining} trailing bytes after value")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        remaining: usize,
    },
}

impl CodecError {
    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(item: impl Into<String>) -> Self {
        Self::UnsupportedType { item: item.into() }
    }
}
