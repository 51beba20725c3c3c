//! BLAKE3 digests for integrity checks and cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// A 32-byte BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-digit hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = crate::encoding::from_hex(s)?;
        crate::encoding::fixed::<32>(&bytes, "digest").map(Self)
    }

    /// Compare against a hex digest without short-circuiting on the first
    /// differing byte.
    pub fn matches_hex(&self, s: &str) -> Result<bool> {
        let other = Self::from_hex(s).map_err(|e| CoreError::Decoding(e.to_string()))?;
        Ok(self
            .0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Compute the BLAKE3 digest of `data`.
pub fn hash(data: &[u8]) -> Digest {
    Digest(*blake3::hash(data).as_bytes())
}
