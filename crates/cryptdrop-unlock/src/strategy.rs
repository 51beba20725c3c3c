//! Unlock strategies: one tagged variant per method.
//!
//! Every variant owns the credential it needs and produces the same
//! output, a private key, so the manager never branches on method details.

use std::sync::Arc;

use zeroize::Zeroizing;

use cryptdrop_core::{CancelToken, KemPrivateKey};

use crate::authenticator::{Authenticator, AuthenticatorClass};
use crate::error::{Result, UnlockError};
use crate::keyfile::KeyFile;
use crate::sealed::SealedKeyMaterial;
use crate::state::UnlockMethod;

/// A way to obtain the private key, with its credential.
pub enum UnlockStrategy {
    Passphrase {
        passphrase: Zeroizing<String>,
    },
    Biometric {
        authenticator: Arc<dyn Authenticator>,
    },
    HardwareKey {
        authenticator: Arc<dyn Authenticator>,
    },
    KeyFile {
        file: KeyFile,
        passphrase: Option<Zeroizing<String>>,
    },
}

impl UnlockStrategy {
    pub fn passphrase(passphrase: impl Into<String>) -> Self {
        UnlockStrategy::Passphrase {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }

    pub fn biometric(authenticator: Arc<dyn Authenticator>) -> Self {
        UnlockStrategy::Biometric { authenticator }
    }

    pub fn hardware_key(authenticator: Arc<dyn Authenticator>) -> Self {
        UnlockStrategy::HardwareKey { authenticator }
    }

    pub fn key_file(file: KeyFile, passphrase: Option<String>) -> Self {
        UnlockStrategy::KeyFile {
            file,
            passphrase: passphrase.map(Zeroizing::new),
        }
    }

    pub fn method(&self) -> UnlockMethod {
        match self {
            UnlockStrategy::Passphrase { .. } => UnlockMethod::Passphrase,
            UnlockStrategy::Biometric { .. } => UnlockMethod::Biometric,
            UnlockStrategy::HardwareKey { .. } => UnlockMethod::HardwareKey,
            UnlockStrategy::KeyFile { .. } => UnlockMethod::KeyFile,
        }
    }

    /// Run the strategy against the account's sealed material.
    ///
    /// Races against `cancel`; a cancel yields `Canceled`.
    pub async fn obtain_private_key(
        &self,
        material: &SealedKeyMaterial,
        cancel: &CancelToken,
    ) -> Result<KemPrivateKey> {
        if cancel.is_cancelled() {
            return Err(UnlockError::Canceled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UnlockError::Canceled),
            result = self.run(material) => result,
        }
    }

    async fn run(&self, material: &SealedKeyMaterial) -> Result<KemPrivateKey> {
        match self {
            UnlockStrategy::Passphrase { passphrase } => {
                let sealed = material
                    .passphrase
                    .as_ref()
                    .ok_or(UnlockError::NotConfigured(UnlockMethod::Passphrase))?;
                sealed.open_blocking(passphrase.clone()).await
            }
            UnlockStrategy::Biometric { authenticator }
            | UnlockStrategy::HardwareKey { authenticator } => {
                let method = self.method();
                let sealed = material
                    .authenticator_seal(method)
                    .ok_or(UnlockError::NotConfigured(method))?;
                if AuthenticatorClass::for_method(method) != Some(authenticator.class())
                    || !authenticator.is_available().await
                {
                    return Err(UnlockError::AuthenticatorUnavailable(method));
                }
                let prf = Zeroizing::new(
                    authenticator
                        .assert(&sealed.credential_id, &sealed.salt)
                        .await?,
                );
                sealed.open(&prf)
            }
            UnlockStrategy::KeyFile { file, passphrase } => file.open(passphrase.as_ref()).await,
        }
    }
}

impl std::fmt::Debug for UnlockStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UnlockStrategy::{:?}", self.method())
    }
}

/// Methods worth offering on this device.
///
/// A method is offerable when it is configured and, for authenticator
/// methods, an available authenticator of the matching class is present.
/// Key files are always offerable.
pub async fn offerable_methods(
    material: &SealedKeyMaterial,
    authenticators: &[Arc<dyn Authenticator>],
) -> Vec<UnlockMethod> {
    let mut methods = Vec::new();
    for method in UnlockMethod::ALL {
        if !material.is_configured(method) {
            continue;
        }
        let offerable = match AuthenticatorClass::for_method(method) {
            None => true,
            Some(class) => {
                let mut found = false;
                for auth in authenticators.iter().filter(|a| a.class() == class) {
                    if auth.is_available().await {
                        found = true;
                        break;
                    }
                }
                found
            }
        };
        if offerable {
            methods.push(method);
        }
    }
    methods
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::{PromptBehavior, SoftwareAuthenticator};
    use crate::kdf::KdfParams;
    use crate::sealed::{AuthenticatorSealedKey, PassphraseSealedKey};
    use cryptdrop_core::{CancelHandle, KeyPair, UserId};

    fn passphrase_material(pair: &KeyPair) -> SealedKeyMaterial {
        SealedKeyMaterial::with_passphrase(
            PassphraseSealedKey::seal(&pair.private, "pw", KdfParams::minimal()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_passphrase_strategy() {
        let pair = KeyPair::generate();
        let material = passphrase_material(&pair);

        let key = UnlockStrategy::passphrase("pw")
            .obtain_private_key(&material, &CancelToken::never())
            .await
            .unwrap();
        assert!(key.matches(&pair.public));

        assert!(matches!(
            UnlockStrategy::passphrase("wrong")
                .obtain_private_key(&material, &CancelToken::never())
                .await,
            Err(UnlockError::Authentication)
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_method() {
        let pair = KeyPair::generate();
        let material = passphrase_material(&pair);
        let auth: Arc<dyn Authenticator> = Arc::new(SoftwareAuthenticator::platform());

        assert!(matches!(
            UnlockStrategy::biometric(auth)
                .obtain_private_key(&material, &CancelToken::never())
                .await,
            Err(UnlockError::NotConfigured(UnlockMethod::Biometric))
        ));
    }

    #[tokio::test]
    async fn test_wrong_authenticator_class() {
        let pair = KeyPair::generate();
        let platform = Arc::new(SoftwareAuthenticator::platform());
        let mut material = passphrase_material(&pair);
        material.set_authenticator_seal(
            AuthenticatorSealedKey::enroll(platform.as_ref(), &UserId::new("a"), &pair.private)
                .await
                .unwrap(),
        );

        assert!(matches!(
            UnlockStrategy::hardware_key(platform.clone())
                .obtain_private_key(&material, &CancelToken::never())
                .await,
            Err(UnlockError::NotConfigured(UnlockMethod::HardwareKey))
        ));

        let roaming: Arc<dyn Authenticator> = Arc::new(SoftwareAuthenticator::cross_platform());
        assert!(matches!(
            UnlockStrategy::biometric(roaming)
                .obtain_private_key(&material, &CancelToken::never())
                .await,
            Err(UnlockError::AuthenticatorUnavailable(UnlockMethod::Biometric))
        ));

        let key = UnlockStrategy::biometric(platform)
            .obtain_private_key(&material, &CancelToken::never())
            .await
            .unwrap();
        assert!(key.matches(&pair.public));
    }

    #[tokio::test]
    async fn test_hanging_prompt_is_cancellable() {
        let pair = KeyPair::generate();
        let auth = Arc::new(SoftwareAuthenticator::platform());
        let mut material = SealedKeyMaterial::new();
        material.set_authenticator_seal(
            AuthenticatorSealedKey::enroll(auth.as_ref(), &UserId::new("a"), &pair.private)
                .await
                .unwrap(),
        );
        auth.set_behavior(PromptBehavior::Hang);

        let (handle, token) = CancelHandle::new();
        let strategy = UnlockStrategy::biometric(auth);
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            handle.cancel();
        });

        assert!(matches!(
            strategy.obtain_private_key(&material, &token).await,
            Err(UnlockError::Canceled)
        ));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_offerable_methods() {
        let pair = KeyPair::generate();
        let platform = Arc::new(SoftwareAuthenticator::platform());
        let mut material = passphrase_material(&pair);
        material.set_authenticator_seal(
            AuthenticatorSealedKey::enroll(platform.as_ref(), &UserId::new("a"), &pair.private)
                .await
                .unwrap(),
        );
        let auths: Vec<Arc<dyn Authenticator>> = vec![platform.clone()];

        assert_eq!(
            offerable_methods(&material, &auths).await,
            vec![
                UnlockMethod::Passphrase,
                UnlockMethod::Biometric,
                UnlockMethod::KeyFile
            ]
        );

        platform.set_available(false);
        assert_eq!(
            offerable_methods(&material, &auths).await,
            vec![UnlockMethod::Passphrase, UnlockMethod::KeyFile]
        );
    }
}
