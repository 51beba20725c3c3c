//! Passphrase key derivation (Argon2id).
//!
//! Parameters travel with every passphrase-sealed blob so they can be
//! raised later without breaking existing blobs.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use cryptdrop_core::SymmetricKey;

use crate::error::{Result, UnlockError};

/// Salt size in bytes.
pub const SALT_LEN: usize = 16;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// 64 MiB, 3 iterations, 4 lanes.
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Smallest parameters Argon2 accepts. Tests only.
    pub fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    pub fn with_memory_kib(mut self, memory_kib: u32) -> Self {
        self.memory_kib = memory_kib;
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(cryptdrop_core::aead::KEY_LEN),
        )
        .map_err(|e| UnlockError::Kdf(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Generate a random salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a passphrase.
pub fn derive_key(passphrase: &str, salt: &[u8], params: &KdfParams) -> Result<SymmetricKey> {
    let mut out = Zeroizing::new([0u8; cryptdrop_core::aead::KEY_LEN]);
    params
        .argon2()?
        .hash_password_into(passphrase.as_bytes(), salt, &mut out[..])
        .map_err(|e| UnlockError::Kdf(e.to_string()))?;
    Ok(SymmetricKey::from_bytes(*out))
}

/// Derive off the async executor. Argon2 at default cost takes long
/// enough to stall a cooperative scheduler.
pub async fn derive_key_blocking(
    passphrase: Zeroizing<String>,
    salt: Vec<u8>,
    params: KdfParams,
) -> Result<SymmetricKey> {
    tokio::task::spawn_blocking(move || derive_key(&passphrase, &salt, &params))
        .await
        .map_err(|e| UnlockError::Kdf(e.to_string()))?
}
