//! Private keys sealed at rest, one seal per unlock method.
//!
//! The private key is never stored in the clear. Each configured method
//! holds its own sealed copy:
//!
//! - passphrase: Argon2id(passphrase, salt) opens the blob
//! - biometric / hardware key: BLAKE3.derive_key(SEAL_CONTEXT, prf || salt)
//!   opens the blob, where `prf` comes from the authenticator

use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use cryptdrop_core::{encoding::base64_array, EncryptedBlob, KemPrivateKey, SymmetricKey, UserId};

use crate::authenticator::{Authenticator, AuthenticatorClass, CredentialId, PRF_LEN};
use crate::error::{Result, UnlockError};
use crate::kdf::{self, KdfParams, SALT_LEN};
use crate::state::UnlockMethod;

/// Key-derivation context for authenticator seal keys.
pub const SEAL_CONTEXT: &str = "cryptdrop 2024 authenticator seal v1";

/// A private key sealed under a passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassphraseSealedKey {
    #[serde(with = "base64_array")]
    pub salt: [u8; SALT_LEN],
    pub kdf: KdfParams,
    pub sealed: EncryptedBlob,
}

impl PassphraseSealedKey {
    /// Seal with a fresh salt.
    pub fn seal(private: &KemPrivateKey, passphrase: &str, kdf: KdfParams) -> Result<Self> {
        let salt = kdf::generate_salt();
        let key = kdf::derive_key(passphrase, &salt, &kdf)?;
        let sealed = key.encrypt(private.as_bytes())?;
        Ok(Self { salt, kdf, sealed })
    }

    /// Open with a passphrase. A wrong passphrase is `Authentication`.
    pub fn open(&self, passphrase: &str) -> Result<KemPrivateKey> {
        let key = kdf::derive_key(passphrase, &self.salt, &self.kdf)?;
        open_blob(&key, &self.sealed)
    }

    /// [`open`](Self::open) on the blocking pool.
    pub async fn open_blocking(&self, passphrase: Zeroizing<String>) -> Result<KemPrivateKey> {
        let key = kdf::derive_key_blocking(passphrase, self.salt.to_vec(), self.kdf).await?;
        open_blob(&key, &self.sealed)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("JSON serialization failed")
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| UnlockError::Serialization(e.to_string()))
    }
}

/// A private key sealed under an authenticator's PRF output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSealedKey {
    pub credential_id: CredentialId,
    pub class: AuthenticatorClass,
    #[serde(with = "base64_array")]
    pub salt: [u8; PRF_LEN],
    pub sealed: EncryptedBlob,
}

impl AuthenticatorSealedKey {
    /// Seal with a PRF output already obtained for `salt`.
    pub fn seal(
        private: &KemPrivateKey,
        credential_id: CredentialId,
        class: AuthenticatorClass,
        prf_output: &[u8; PRF_LEN],
        salt: [u8; PRF_LEN],
    ) -> Result<Self> {
        let key = seal_key(prf_output, &salt);
        let sealed = key.encrypt(private.as_bytes())?;
        Ok(Self {
            credential_id,
            class,
            salt,
            sealed,
        })
    }

    /// Register a credential for `account` and seal `private` under it.
    pub async fn enroll(
        authenticator: &dyn Authenticator,
        account: &UserId,
        private: &KemPrivateKey,
    ) -> Result<Self> {
        let credential = authenticator.register(account).await?;
        let mut salt = [0u8; PRF_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        let prf = Zeroizing::new(authenticator.assert(&credential, &salt).await?);
        Self::seal(private, credential, authenticator.class(), &prf, salt)
    }

    /// Open with the PRF output for this seal's salt.
    pub fn open(&self, prf_output: &[u8; PRF_LEN]) -> Result<KemPrivateKey> {
        open_blob(&seal_key(prf_output, &self.salt), &self.sealed)
    }

    pub fn method(&self) -> UnlockMethod {
        self.class.method()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("JSON serialization failed")
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| UnlockError::Serialization(e.to_string()))
    }
}

fn seal_key(prf_output: &[u8; PRF_LEN], salt: &[u8; PRF_LEN]) -> SymmetricKey {
    SymmetricKey::derive(SEAL_CONTEXT, &[prf_output, salt])
}

fn open_blob(key: &SymmetricKey, blob: &EncryptedBlob) -> Result<KemPrivateKey> {
    let bytes = Zeroizing::new(key.decrypt(blob)?);
    KemPrivateKey::from_slice(&bytes).map_err(|_| UnlockError::Authentication)
}

/// Every sealed copy of one account's private key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SealedKeyMaterial {
    pub passphrase: Option<PassphraseSealedKey>,
    pub biometric: Option<AuthenticatorSealedKey>,
    pub hardware_key: Option<AuthenticatorSealedKey>,
}

impl SealedKeyMaterial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Material with only a passphrase seal.
    pub fn with_passphrase(sealed: PassphraseSealedKey) -> Self {
        Self {
            passphrase: Some(sealed),
            ..Self::default()
        }
    }

    /// Whether a sealed copy exists for `method`. Key files are carried by
    /// the user and never stored.
    pub fn is_configured(&self, method: UnlockMethod) -> bool {
        match method {
            UnlockMethod::Passphrase => self.passphrase.is_some(),
            UnlockMethod::Biometric => self.biometric.is_some(),
            UnlockMethod::HardwareKey => self.hardware_key.is_some(),
            UnlockMethod::KeyFile => true,
        }
    }

    /// The authenticator seal for `method`, if any.
    pub fn authenticator_seal(&self, method: UnlockMethod) -> Option<&AuthenticatorSealedKey> {
        match method {
            UnlockMethod::Biometric => self.biometric.as_ref(),
            UnlockMethod::HardwareKey => self.hardware_key.as_ref(),
            _ => None,
        }
    }

    /// Store an authenticator seal in the slot for its class.
    pub fn set_authenticator_seal(&mut self, sealed: AuthenticatorSealedKey) {
        match sealed.class {
            AuthenticatorClass::Platform => self.biometric = Some(sealed),
            AuthenticatorClass::CrossPlatform => self.hardware_key = Some(sealed),
        }
    }

    /// Drop authenticator seals, e.g. after the key they hold was retired.
    pub fn clear_authenticator_seals(&mut self) {
        self.biometric = None;
        self.hardware_key = None;
    }

    /// Encode as `{method tag: JSON}` for a stored profile.
    pub fn to_tagged(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(p) = &self.passphrase {
            map.insert(UnlockMethod::Passphrase.tag().to_string(), p.to_json());
        }
        if let Some(b) = &self.biometric {
            map.insert(UnlockMethod::Biometric.tag().to_string(), b.to_json());
        }
        if let Some(h) = &self.hardware_key {
            map.insert(UnlockMethod::HardwareKey.tag().to_string(), h.to_json());
        }
        map
    }

    /// Decode a stored `{method tag: JSON}` map. Unknown tags are ignored.
    pub fn from_tagged(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut material = Self::new();
        for (tag, json) in map {
            match UnlockMethod::from_tag(tag) {
                Some(UnlockMethod::Passphrase) => {
                    material.passphrase = Some(PassphraseSealedKey::from_json(json)?)
                }
                Some(UnlockMethod::Biometric) => {
                    material.biometric = Some(AuthenticatorSealedKey::from_json(json)?)
                }
                Some(UnlockMethod::HardwareKey) => {
                    material.hardware_key = Some(AuthenticatorSealedKey::from_json(json)?)
                }
                Some(UnlockMethod::KeyFile) | None => {
                    tracing::debug!(tag = %tag, "ignoring unknown sealed key tag");
                }
            }
        }
        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::SoftwareAuthenticator;
    use cryptdrop_core::KeyPair;

    #[test]
    fn test_passphrase_seal() {
        let pair = KeyPair::generate();
        let sealed = PassphraseSealedKey::seal(&pair.private, "hunter2", KdfParams::minimal()).unwrap();

        let opened = sealed.open("hunter2").unwrap();
        assert_eq!(opened.as_bytes(), pair.private.as_bytes());

        assert!(matches!(sealed.open("hunter3"), Err(UnlockError::Authentication)));
    }

    #[test]
    fn test_passphrase_seal_json() {
        let pair = KeyPair::generate();
        let sealed = PassphraseSealedKey::seal(&pair.private, "pw", KdfParams::minimal()).unwrap();

        let json = sealed.to_json();
        assert!(json.contains("\"memoryKib\":8"));
        assert_eq!(PassphraseSealedKey::from_json(&json).unwrap(), sealed);
    }

    #[tokio::test]
    async fn test_enroll_and_open() {
        let pair = KeyPair::generate();
        let auth = SoftwareAuthenticator::platform();
        let alice = UserId::new("alice");

        let sealed = AuthenticatorSealedKey::enroll(&auth, &alice, &pair.private)
            .await
            .unwrap();
        assert_eq!(sealed.method(), UnlockMethod::Biometric);

        let prf = auth.assert(&sealed.credential_id, &sealed.salt).await.unwrap();
        assert_eq!(sealed.open(&prf).unwrap().as_bytes(), pair.private.as_bytes());
        assert!(matches!(sealed.open(&[0; 32]), Err(UnlockError::Authentication)));
    }

    #[test]
    fn test_tagged_roundtrip() {
        let pair = KeyPair::generate();
        let mut material = SealedKeyMaterial::with_passphrase(
            PassphraseSealedKey::seal(&pair.private, "pw", KdfParams::minimal()).unwrap(),
        );
        material.set_authenticator_seal(
            AuthenticatorSealedKey::seal(
                &pair.private,
                CredentialId::from_bytes(vec![9; 16]),
                AuthenticatorClass::CrossPlatform,
                &[3; 32],
                [4; 32],
            )
            .unwrap(),
        );

        let tagged = material.to_tagged();
        assert_eq!(
            tagged.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["hardwareKey", "passphrase"]
        );

        let back = SealedKeyMaterial::from_tagged(&tagged).unwrap();
        assert_eq!(back, material);
        assert!(back.is_configured(UnlockMethod::HardwareKey));
        assert!(!back.is_configured(UnlockMethod::Biometric));
    }
}
