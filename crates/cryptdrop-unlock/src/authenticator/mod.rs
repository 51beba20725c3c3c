//! Authenticator abstraction for biometric and hardware-key unlock.
//!
//! An authenticator holds a credential per account and, given a salt,
//! returns a 32-byte pseudo-random output bound to that credential (the
//! WebAuthn PRF / hmac-secret extension). The output never leaves the
//! unlock path; it only derives the key that seals the private key.

pub mod software;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use cryptdrop_core::{encoding::base64_bytes, UserId};

use crate::error::Result;
use crate::state::UnlockMethod;

pub use software::{PromptBehavior, SoftwareAuthenticator};

/// Length of a PRF output and of the salt fed to it.
pub const PRF_LEN: usize = 32;

/// Where the authenticator lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthenticatorClass {
    /// Built into the device (fingerprint, face).
    Platform,
    /// External roaming device (security key).
    CrossPlatform,
}

impl AuthenticatorClass {
    /// The class an unlock method needs.
    pub fn for_method(method: UnlockMethod) -> Option<Self> {
        match method {
            UnlockMethod::Biometric => Some(AuthenticatorClass::Platform),
            UnlockMethod::HardwareKey => Some(AuthenticatorClass::CrossPlatform),
            UnlockMethod::Passphrase | UnlockMethod::KeyFile => None,
        }
    }

    /// The unlock method this class backs.
    pub fn method(&self) -> UnlockMethod {
        match self {
            AuthenticatorClass::Platform => UnlockMethod::Biometric,
            AuthenticatorClass::CrossPlatform => UnlockMethod::HardwareKey,
        }
    }
}

/// Opaque credential handle issued at registration.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(#[serde(with = "base64_bytes")] Vec<u8>);

impl CredentialId {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialId({})", hex_prefix(&self.0))
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    let hex = cryptdrop_core::encoding::to_hex(bytes);
    hex.chars().take(16).collect()
}

/// A platform or roaming authenticator.
///
/// `assert` may suspend indefinitely waiting for the user. Callers race
/// it against a cancel token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn class(&self) -> AuthenticatorClass;

    /// Whether the authenticator can be used on this device right now.
    async fn is_available(&self) -> bool;

    /// Create a credential for `account`.
    async fn register(&self, account: &UserId) -> Result<CredentialId>;

    /// Prompt the user and return the PRF output for `salt`.
    ///
    /// Fails with `NotConfigured` for an unknown credential and `Canceled`
    /// when the user dismisses the prompt.
    async fn assert(&self, credential: &CredentialId, salt: &[u8; PRF_LEN]) -> Result<[u8; PRF_LEN]>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_method_mapping() {
        for class in [AuthenticatorClass::Platform, AuthenticatorClass::CrossPlatform] {
            assert_eq!(AuthenticatorClass::for_method(class.method()), Some(class));
        }
        assert_eq!(AuthenticatorClass::for_method(UnlockMethod::Passphrase), None);
    }

    #[test]
    fn test_credential_id_json_is_base64() {
        let id = CredentialId::from_bytes(vec![1, 2, 3]);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"AQID\"");
    }
}
