//! Software authenticator for tests and headless hosts.
//!
//! Credentials are random 32-byte secrets held in memory. The PRF output
//! is BLAKE3 keyed by the credential secret over the salt, matching the
//! shape of hmac-secret.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use rand::RngCore;
use zeroize::Zeroizing;

use cryptdrop_core::UserId;

use super::{Authenticator, AuthenticatorClass, CredentialId, PRF_LEN};
use crate::error::{Result, UnlockError};
use crate::state::UnlockMethod;

/// How the simulated user answers the next prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptBehavior {
    Approve,
    /// Dismiss the prompt.
    Cancel,
    /// Never answer.
    Hang,
}

struct Credential {
    account: UserId,
    secret: Zeroizing<[u8; 32]>,
}

/// In-memory authenticator.
pub struct SoftwareAuthenticator {
    class: AuthenticatorClass,
    available: AtomicBool,
    behavior: RwLock<PromptBehavior>,
    credentials: RwLock<HashMap<CredentialId, Credential>>,
}

impl SoftwareAuthenticator {
    pub fn new(class: AuthenticatorClass) -> Self {
        Self {
            class,
            available: AtomicBool::new(true),
            behavior: RwLock::new(PromptBehavior::Approve),
            credentials: RwLock::new(HashMap::new()),
        }
    }

    pub fn platform() -> Self {
        Self::new(AuthenticatorClass::Platform)
    }

    pub fn cross_platform() -> Self {
        Self::new(AuthenticatorClass::CrossPlatform)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_behavior(&self, behavior: PromptBehavior) {
        if let Ok(mut b) = self.behavior.write() {
            *b = behavior;
        }
    }

    /// Forget a credential, as if the user deleted it from the device.
    pub fn remove_credential(&self, credential: &CredentialId) -> bool {
        self.credentials
            .write()
            .map(|mut c| c.remove(credential).is_some())
            .unwrap_or(false)
    }

    fn behavior(&self) -> PromptBehavior {
        self.behavior
            .read()
            .map(|b| *b)
            .unwrap_or(PromptBehavior::Approve)
    }

    fn method(&self) -> UnlockMethod {
        self.class.method()
    }
}

#[async_trait]
impl Authenticator for SoftwareAuthenticator {
    fn class(&self) -> AuthenticatorClass {
        self.class
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn register(&self, account: &UserId) -> Result<CredentialId> {
        if !self.is_available().await {
            return Err(UnlockError::AuthenticatorUnavailable(self.method()));
        }

        let mut id = [0u8; 16];
        let mut secret = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut id);
        rand::thread_rng().fill_bytes(&mut secret[..]);

        let credential = CredentialId::from_bytes(id.to_vec());
        self.credentials
            .write()
            .map_err(|_| UnlockError::AuthenticatorUnavailable(self.method()))?
            .insert(
                credential.clone(),
                Credential {
                    account: account.clone(),
                    secret,
                },
            );
        Ok(credential)
    }

    async fn assert(&self, credential: &CredentialId, salt: &[u8; PRF_LEN]) -> Result<[u8; PRF_LEN]> {
        if !self.is_available().await {
            return Err(UnlockError::AuthenticatorUnavailable(self.method()));
        }

        match self.behavior() {
            PromptBehavior::Approve => {}
            PromptBehavior::Cancel => return Err(UnlockError::Canceled),
            PromptBehavior::Hang => std::future::pending::<()>().await,
        }

        let credentials = self
            .credentials
            .read()
            .map_err(|_| UnlockError::AuthenticatorUnavailable(self.method()))?;
        let cred = credentials
            .get(credential)
            .ok_or(UnlockError::NotConfigured(self.method()))?;

        tracing::debug!(account = %cred.account, "authenticator assertion");
        Ok(*blake3::keyed_hash(&cred.secret, salt).as_bytes())
    }
}

impl std::fmt::Debug for SoftwareAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareAuthenticator")
            .field("class", &self.class)
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prf_is_stable_per_credential_and_salt() {
        let auth = SoftwareAuthenticator::platform();
        let alice = UserId::new("alice");
        let cred = auth.register(&alice).await.unwrap();
        let other = auth.register(&alice).await.unwrap();

        let a = auth.assert(&cred, &[1; 32]).await.unwrap();
        assert_eq!(a, auth.assert(&cred, &[1; 32]).await.unwrap());
        assert_ne!(a, auth.assert(&cred, &[2; 32]).await.unwrap());
        assert_ne!(a, auth.assert(&other, &[1; 32]).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_credential_is_not_configured() {
        let auth = SoftwareAuthenticator::cross_platform();
        let result = auth
            .assert(&CredentialId::from_bytes(vec![0; 16]), &[0; 32])
            .await;
        assert!(matches!(
            result,
            Err(UnlockError::NotConfigured(UnlockMethod::HardwareKey))
        ));
    }

    #[tokio::test]
    async fn test_cancel_and_unavailable() {
        let auth = SoftwareAuthenticator::platform();
        let cred = auth.register(&UserId::new("a")).await.unwrap();

        auth.set_behavior(PromptBehavior::Cancel);
        assert!(matches!(
            auth.assert(&cred, &[0; 32]).await,
            Err(UnlockError::Canceled)
        ));

        auth.set_available(false);
        assert!(!auth.is_available().await);
        assert!(matches!(
            auth.register(&UserId::new("b")).await,
            Err(UnlockError::AuthenticatorUnavailable(_))
        ));
    }
}
