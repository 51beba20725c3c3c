//! Error types for cryptdrop core.

use thiserror::Error;

/// Core errors that can occur during key and blob operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The AEAD tag did not verify: tampered ciphertext or wrong key.
    #[error("authentication failed")]
    Authentication,

    #[error("invalid {kind} length: expected {expected}, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),
}

impl CoreError {
    /// Whether this error is an AEAD verification failure.
    pub fn is_authentication(&self) -> bool {
        matches!(self, CoreError::Authentication)
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
