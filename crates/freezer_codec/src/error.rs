//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before the payload was complete.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The type tag is not part of the layout.
    #[error("unknown type tag: {tag}")]
    UnknownTag {
        /// The unrecognized tag byte.
        tag: u8,
    },

    /// Bytes remained after a complete value.
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        count: usize,
    },

    /// A string payload was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A value does not fit the declared attribute type.
    #[error("value type {actual} does not match declared type {declared}")]
    TypeMismatch {
        /// Type name of the provided value.
        actual: String,
        /// Declared attribute type name.
        declared: String,
    },
}

impl CodecError {
    /// Create a type mismatch error.
    pub fn type_mismatch(actual: impl Into<String>, declared: impl Into<String>) -> Self {
        Self::TypeMismatch {
            actual: actual.into(),
            declared: declared.into(),
        }
    }
}
