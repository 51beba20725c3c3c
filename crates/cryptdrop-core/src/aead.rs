//! Authenticated symmetric encryption.
//!
//! XChaCha20-Poly1305 with 256-bit keys and 192-bit random nonces. Every
//! encryption draws a fresh nonce from the OS RNG, so a key never sees the
//! same nonce twice with overwhelming probability.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding::{base64_array, base64_bytes};
use crate::error::{CoreError, Result};

/// Key size in bytes.
pub const KEY_LEN: usize = 32;
/// Nonce size in bytes.
pub const NONCE_LEN: usize = 24;
/// Poly1305 tag size in bytes.
pub const TAG_LEN: usize = 16;

/// A 256-bit symmetric key.
///
/// Used for per-object content secrets, recipient wrap keys, and keys
/// derived from passphrases or authenticators. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        crate::encoding::fixed::<KEY_LEN>(bytes, "symmetric key").map(Self)
    }

    /// Derive a key from input keying material under a context string.
    ///
    /// Uses BLAKE3's key derivation mode for domain separation.
    pub fn derive(context: &str, material: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(context);
        for part in material {
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Encrypt with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob> {
        let nonce = BlobNonce::generate();
        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CoreError::Encryption(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| CoreError::Encryption(e.to_string()))?;

        Ok(EncryptedBlob { ciphertext, nonce })
    }

    /// Decrypt and verify a blob.
    ///
    /// Fails with [`CoreError::Authentication`] on a tag mismatch, which is
    /// how a wrong key shows up.
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Vec<u8>> {
        if blob.ciphertext.len() < TAG_LEN {
            return Err(CoreError::Authentication);
        }
        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CoreError::Encryption(e.to_string()))?;
        cipher
            .decrypt(XNonce::from_slice(&blob.nonce.0), blob.ciphertext.as_slice())
            .map_err(|_| CoreError::Authentication)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        // Non-short-circuiting comparison.
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for SymmetricKey {}

/// A 192-bit XChaCha20 nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobNonce(#[serde(with = "base64_array")] pub [u8; NONCE_LEN]);

impl BlobNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

/// Output of one AEAD operation.
///
/// Wire format: `{"ciphertext": base64, "nonce": base64}`. Immutable once
/// written; changing the plaintext means a new blob with a new nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// Ciphertext followed by the Poly1305 tag.
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,

    /// Nonce used for this encryption.
    pub nonce: BlobNonce,
}

impl EncryptedBlob {
    /// Length of the plaintext this blob decrypts to.
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(TAG_LEN)
    }
}

/// Encrypt `plaintext` under `secret` with a fresh nonce.
pub fn encrypt_symmetric(plaintext: &[u8], secret: &SymmetricKey) -> Result<EncryptedBlob> {
    secret.encrypt(plaintext)
}

/// Decrypt `blob` under `secret`, failing with `Authentication` on tag mismatch.
pub fn decrypt_symmetric(blob: &EncryptedBlob, secret: &SymmetricKey) -> Result<Vec<u8>> {
    secret.decrypt(blob)
}
