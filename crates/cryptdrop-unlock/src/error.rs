//! Error types for unlock operations.

use cryptdrop_core::CoreError;
use thiserror::Error;

use crate::state::UnlockMethod;

/// Text shown for any credential failure. Identical for a wrong passphrase
/// and a damaged key file.
pub const INCORRECT_CREDENTIAL: &str = "incorrect credential";

/// Errors that can occur while unlocking or holding a private key.
#[derive(Debug, Error)]
pub enum UnlockError {
    /// The derived key did not open the sealed private key, or the opened
    /// key does not belong to the account.
    #[error("authentication failed")]
    Authentication,

    /// The method was never set up for this account.
    #[error("{0} unlock is not configured")]
    NotConfigured(UnlockMethod),

    /// No authenticator of the required class is available here.
    #[error("no authenticator available for {0} unlock")]
    AuthenticatorUnavailable(UnlockMethod),

    /// The user dismissed the prompt or the caller cancelled.
    #[error("unlock canceled")]
    Canceled,

    /// Unrecognized or structurally invalid key file.
    #[error("malformed key file: {0}")]
    MalformedKeyFile(String),

    /// The key file is encrypted and no passphrase was given.
    #[error("key file requires a passphrase")]
    PassphraseRequired,

    /// No unlocked key is held.
    #[error("private key is locked")]
    Locked,

    /// Key derivation failed (bad parameters).
    #[error("key derivation error: {0}")]
    Kdf(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core error.
    #[error("core error: {0}")]
    Core(CoreError),
}

impl UnlockError {
    /// Message safe to show the user.
    ///
    /// Credential failures collapse to one text so the UI never reveals
    /// whether a file was corrupt or a passphrase wrong.
    pub fn user_message(&self) -> String {
        match self {
            UnlockError::Authentication | UnlockError::MalformedKeyFile(_) => {
                INCORRECT_CREDENTIAL.to_string()
            }
            UnlockError::PassphraseRequired => "enter the passphrase for this key file".to_string(),
            UnlockError::NotConfigured(method) => {
                format!("{method} unlock is not set up; configure it in your profile")
            }
            UnlockError::AuthenticatorUnavailable(method) => {
                format!("{method} unlock is not available on this device")
            }
            UnlockError::Canceled => "unlock canceled".to_string(),
            UnlockError::Locked => "unlock your key to continue".to_string(),
            _ => "unlock failed".to_string(),
        }
    }

    /// Whether this is a credential failure.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            UnlockError::Authentication | UnlockError::MalformedKeyFile(_)
        )
    }
}

impl From<CoreError> for UnlockError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Authentication => UnlockError::Authentication,
            other => UnlockError::Core(other),
        }
    }
}

/// Result type for unlock operations.
pub type Result<T> = std::result::Result<T, UnlockError>;
