//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write batch exceeded the backend's limit.
    #[error("batch of {size} operations exceeds limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// The backend rejected or failed a write.
    #[error("backend error: {0}")]
    Backend(String),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
