//! Error types for SoleFeed domain operations.

use crate::ids::IdError;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in domain-level validation.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Client-supplied input is malformed or out of bounds.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invalid price value.
    #[error("invalid price: {0}")]
    InvalidPrice(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
