//! Key files: a private key carried by the user outside the app.
//!
//! Two on-disk shapes are accepted:
//!
//! - JSON: `{"keyType": "ML-KEM-1024", ...}` holding either a
//!   passphrase-encrypted key (`encryptedPrivateKey` + `salt` + `kdf`) or a
//!   decrypted one (`privateKeyHex`)
//! - plain text: one line of fixed-length hex
//!
//! Structure is validated before any decryption runs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use cryptdrop_core::{
    encoding::{self, base64_array},
    kem::PRIVATE_KEY_LEN,
    EncryptedBlob, KemPrivateKey,
};

use crate::error::{Result, UnlockError};
use crate::kdf::{self, KdfParams, SALT_LEN};

/// The only key type this version understands.
pub const KEY_TYPE: &str = "ML-KEM-1024";

/// Hex length of a raw private key.
pub const PRIVATE_KEY_HEX_LEN: usize = PRIVATE_KEY_LEN * 2;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct KeyFileJson {
    key_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_private_key: Option<EncryptedBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kdf: Option<KdfParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_key_hex: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptedKeyFileRef<'a> {
    key_type: &'a str,
    encrypted_private_key: &'a EncryptedBlob,
    #[serde(with = "base64_array")]
    salt: [u8; SALT_LEN],
    kdf: KdfParams,
}

/// A parsed key file.
pub enum KeyFile {
    /// Passphrase-encrypted JSON form.
    Encrypted {
        sealed: EncryptedBlob,
        salt: [u8; SALT_LEN],
        kdf: KdfParams,
    },
    /// JSON form carrying the key in hex.
    Decrypted(KemPrivateKey),
    /// Bare hex line.
    Plain(KemPrivateKey),
}

impl KeyFile {
    /// Parse file contents. Rejects anything structurally off with
    /// `MalformedKeyFile`.
    pub fn parse(contents: &str) -> Result<Self> {
        let trimmed = contents.trim();
        if trimmed.starts_with('{') {
            Self::parse_json(trimmed)
        } else {
            Ok(KeyFile::Plain(parse_hex_key(trimmed)?))
        }
    }

    fn parse_json(json: &str) -> Result<Self> {
        let file: KeyFileJson =
            serde_json::from_str(json).map_err(|e| UnlockError::MalformedKeyFile(e.to_string()))?;

        if file.key_type != KEY_TYPE {
            return Err(UnlockError::MalformedKeyFile(format!(
                "unrecognized key type {:?}",
                file.key_type
            )));
        }

        match (file.encrypted_private_key, file.private_key_hex) {
            (Some(sealed), None) => {
                let salt = file
                    .salt
                    .ok_or_else(|| UnlockError::MalformedKeyFile("encrypted key without salt".into()))?;
                let salt = encoding::from_base64(&salt)
                    .and_then(|bytes| encoding::fixed::<SALT_LEN>(&bytes, "salt"))
                    .map_err(|e| UnlockError::MalformedKeyFile(e.to_string()))?;
                Ok(KeyFile::Encrypted {
                    sealed,
                    salt,
                    kdf: file.kdf.unwrap_or_default(),
                })
            }
            (None, Some(hex)) => Ok(KeyFile::Decrypted(parse_hex_key(hex.trim())?)),
            (Some(_), Some(_)) => Err(UnlockError::MalformedKeyFile(
                "both encrypted and plain key present".into(),
            )),
            (None, None) => Err(UnlockError::MalformedKeyFile("no key present".into())),
        }
    }

    /// Read and parse a key file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = Zeroizing::new(std::fs::read_to_string(path)?);
        Self::parse(&contents)
    }

    /// Whether opening needs a passphrase.
    pub fn requires_passphrase(&self) -> bool {
        matches!(self, KeyFile::Encrypted { .. })
    }

    /// Produce the private key.
    ///
    /// The encrypted form needs a passphrase (`PassphraseRequired` without
    /// one, `Authentication` on a wrong one). The passphrase is ignored for
    /// the other forms.
    pub async fn open(&self, passphrase: Option<&Zeroizing<String>>) -> Result<KemPrivateKey> {
        match self {
            KeyFile::Encrypted { sealed, salt, kdf } => {
                let passphrase = passphrase.ok_or(UnlockError::PassphraseRequired)?;
                let key = kdf::derive_key_blocking(passphrase.clone(), salt.to_vec(), *kdf).await?;
                let bytes = Zeroizing::new(key.decrypt(sealed)?);
                KemPrivateKey::from_slice(&bytes).map_err(|_| UnlockError::Authentication)
            }
            KeyFile::Decrypted(key) | KeyFile::Plain(key) => Ok(key.clone()),
        }
    }

    /// Plain-text export: the key as one hex line.
    pub fn export_plain(key: &KemPrivateKey) -> Zeroizing<String> {
        let mut out = key.to_hex();
        out.push('\n');
        out
    }

    /// Encrypted JSON export.
    pub fn export_encrypted(key: &KemPrivateKey, passphrase: &str, kdf: KdfParams) -> Result<String> {
        let salt = kdf::generate_salt();
        let sealed = kdf::derive_key(passphrase, &salt, &kdf)?.encrypt(key.as_bytes())?;
        serde_json::to_string_pretty(&EncryptedKeyFileRef {
            key_type: KEY_TYPE,
            encrypted_private_key: &sealed,
            salt,
            kdf,
        })
        .map_err(|e| UnlockError::Serialization(e.to_string()))
    }
}

impl std::fmt::Debug for KeyFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let form = match self {
            KeyFile::Encrypted { .. } => "Encrypted",
            KeyFile::Decrypted(_) => "Decrypted",
            KeyFile::Plain(_) => "Plain",
        };
        write!(f, "KeyFile::{form}")
    }
}

fn parse_hex_key(hex: &str) -> Result<KemPrivateKey> {
    if hex.len() != PRIVATE_KEY_HEX_LEN {
        return Err(UnlockError::MalformedKeyFile(format!(
            "expected {PRIVATE_KEY_HEX_LEN} hex characters, got {}",
            hex.len()
        )));
    }
    KemPrivateKey::from_hex(hex).map_err(|e| UnlockError::MalformedKeyFile(e.to_string()))
}
