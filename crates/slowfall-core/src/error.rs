//! Common error types for slowfall.

use thiserror::Error;

/// A result type using `IdError`.
pub type Result<T> = std::result::Result<T, IdError>;

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The identifier is empty or only whitespace.
    #[error("identifier is empty")]
    Empty,

    /// The identifier exceeds the maximum length.
    #[error("identifier too long: max {max} bytes, got {got}")]
    TooLong {
        /// The maximum number of bytes.
        max: usize,
        /// The actual number of bytes.
        got: usize,
    },

    /// The identifier contains control characters or surrounding whitespace.
    #[error("identifier contains invalid characters")]
    InvalidCharacters,
}
