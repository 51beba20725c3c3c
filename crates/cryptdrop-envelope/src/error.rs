//! Error types for envelope operations.

use cryptdrop_core::{CoreError, UserId};
use thiserror::Error;

/// Errors that can occur while wrapping keys or encrypting objects.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The private key does not open this wrapped key.
    #[error("private key does not match wrapped key")]
    KeyMismatch,

    /// No wrapped key exists for this user. Access was never granted.
    #[error("object is not shared with {0}")]
    NotSharedWithUser(UserId),

    /// The owner's wrapped key is permanent.
    #[error("cannot remove owner {0} from recipients")]
    CannotRemoveOwner(UserId),

    /// A metadata field decrypted but did not parse.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// A blob or wrapped key failed authentication.
    #[error("authentication failed")]
    Authentication,

    /// Structurally invalid wrapped key.
    #[error("malformed wrapped key: {0}")]
    Malformed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(CoreError),
}

impl From<CoreError> for EnvelopeError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Authentication => EnvelopeError::Authentication,
            other => EnvelopeError::Core(other),
        }
    }
}

/// Result type for envelope operations.
pub type Result<T> = std::result::Result<T, EnvelopeError>;
