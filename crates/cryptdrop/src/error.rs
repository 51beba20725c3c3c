//! Error types for the Vault.

use cryptdrop_core::{CoreError, ObjectId, UserId};
use cryptdrop_envelope::EnvelopeError;
use cryptdrop_rotation::RotationError;
use cryptdrop_store::StoreError;
use cryptdrop_unlock::UnlockError;
use thiserror::Error;

/// Errors that can occur during Vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Primitive error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Envelope error.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Unlock error.
    #[error("unlock error: {0}")]
    Unlock(#[from] UnlockError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Rotation error.
    #[error("rotation error: {0}")]
    Rotation(#[from] RotationError),

    /// A profile already exists for this user.
    #[error("account already exists: {0}")]
    AccountExists(UserId),

    /// No profile exists for this user.
    #[error("account not found: {0}")]
    AccountNotFound(UserId),

    /// Object document or blob not found.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// The recipient has no published public key.
    #[error("recipient not found: {0}")]
    RecipientNotFound(UserId),

    /// Only the owner may do this.
    #[error("not the owner of {0}")]
    NotOwner(ObjectId),

    /// The stored content blob does not match its recorded digest.
    #[error("integrity check failed for {0}")]
    IntegrityCheckFailed(ObjectId),

    /// A blocking task did not complete.
    #[error("task failed: {0}")]
    Task(String),
}

impl VaultError {
    /// Message safe to show the user.
    pub fn user_message(&self) -> String {
        match self {
            VaultError::Unlock(e) => e.user_message(),
            VaultError::Envelope(EnvelopeError::NotSharedWithUser(_)) => {
                "this item has not been shared with you".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the caller must unlock before retrying.
    pub fn is_locked(&self) -> bool {
        matches!(self, VaultError::Unlock(UnlockError::Locked))
    }
}

/// Result type for Vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
