//! Error types for the Freezer core.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error: I/O, corruption, constraint violations,
    /// or a lost race for the exclusive write lock.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Value encoding or decoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] freezer_codec::CodecError),

    /// Unknown attribute, type mismatch, or a conflicting redefinition.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the schema violation.
        message: String,
    },

    /// Illegal transaction nesting (a write opened inside a read).
    #[error("nesting error: {message}")]
    Nesting {
        /// Description of the nesting violation.
        message: String,
    },

    /// The top-level transaction rolled back because a nested block failed.
    ///
    /// Returned when an outer block swallows a nested failure; the commit
    /// never happened, so the outer result cannot be reported as success.
    #[error("transaction rolled back by a nested failure")]
    RolledBack,
}

impl StoreError {
    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a nesting error.
    pub fn nesting(message: impl Into<String>) -> Self {
        Self::Nesting {
            message: message.into(),
        }
    }
}
