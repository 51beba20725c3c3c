//! ML-KEM-1024 key encapsulation.
//!
//! Key pairs are generated at signup and on rotation. The public key is
//! published; the private key only ever leaves memory sealed (see the
//! unlock crate).

use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, Encoded, EncodedSizeUser, KemCore, MlKem1024};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::encoding::{self, base64_bytes};
use crate::error::{CoreError, Result};

type EncapsulationKey = <MlKem1024 as KemCore>::EncapsulationKey;
type DecapsulationKey = <MlKem1024 as KemCore>::DecapsulationKey;

/// Encoded public (encapsulation) key size.
pub const PUBLIC_KEY_LEN: usize = 1568;
/// Encoded private (decapsulation) key size.
pub const PRIVATE_KEY_LEN: usize = 3168;
/// Encapsulation (KEM ciphertext) size.
pub const ENCAPSULATION_LEN: usize = 1568;
/// Shared secret size.
pub const SHARED_SECRET_LEN: usize = 32;

/// Offset of the embedded public key inside an encoded private key.
const EMBEDDED_PUBLIC_KEY_OFFSET: usize = 1536;

/// An ML-KEM-1024 public key.
///
/// Serialized as standard base64 of the 1568 encoded bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "KemPublicKeyWire", into = "KemPublicKeyWire")]
pub struct KemPublicKey(Vec<u8>);

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct KemPublicKeyWire(#[serde(with = "base64_bytes")] Vec<u8>);

impl TryFrom<KemPublicKeyWire> for KemPublicKey {
    type Error = CoreError;

    fn try_from(wire: KemPublicKeyWire) -> Result<Self> {
        Self::from_slice(&wire.0)
    }
}

impl From<KemPublicKey> for KemPublicKeyWire {
    fn from(key: KemPublicKey) -> Self {
        Self(key.0)
    }
}

impl KemPublicKey {
    /// Create from encoded bytes, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(CoreError::InvalidLength {
                kind: "public key",
                expected: PUBLIC_KEY_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Parse from standard base64.
    pub fn from_base64(s: &str) -> Result<Self> {
        Self::from_slice(&encoding::from_base64(s)?)
    }

    /// Encode as standard base64.
    pub fn to_base64(&self) -> String {
        encoding::to_base64(&self.0)
    }

    /// Get the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// BLAKE3 fingerprint of the key, for logs and comparisons.
    pub fn fingerprint(&self) -> crate::Digest {
        crate::hash(&self.0)
    }

    /// Encapsulate a fresh shared secret to this key.
    pub fn encapsulate(&self) -> Result<(Encapsulation, SharedSecret)> {
        let encoded = Encoded::<EncapsulationKey>::try_from(self.0.as_slice())
            .map_err(|_| CoreError::Decoding("malformed public key".into()))?;
        let ek = EncapsulationKey::from_bytes(&encoded);

        let (ct, ss) = ek
            .encapsulate(&mut rand::thread_rng())
            .map_err(|_| CoreError::Encryption("encapsulation failed".into()))?;

        let mut secret = [0u8; SHARED_SECRET_LEN];
        secret.copy_from_slice(ss.as_slice());

        Ok((Encapsulation(ct.as_slice().to_vec()), SharedSecret(secret)))
    }
}

impl fmt::Debug for KemPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KemPublicKey({})", &self.fingerprint().to_hex()[..16])
    }
}

/// An ML-KEM-1024 private key.
///
/// Zeroized on drop. `Debug` never prints key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KemPrivateKey(Vec<u8>);

impl KemPrivateKey {
    /// Create from encoded bytes, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(CoreError::InvalidLength {
                kind: "private key",
                expected: PRIVATE_KEY_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Parse from hex. The input must be exactly `2 * PRIVATE_KEY_LEN` digits.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != PRIVATE_KEY_LEN * 2 {
            return Err(CoreError::InvalidLength {
                kind: "private key hex",
                expected: PRIVATE_KEY_LEN * 2,
                actual: s.len(),
            });
        }
        let bytes = Zeroizing::new(encoding::from_hex(s)?);
        Self::from_slice(&bytes)
    }

    /// Encode as lowercase hex. The returned string zeroizes on drop.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(encoding::to_hex(&self.0))
    }

    /// Get the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The public key embedded in this private key.
    pub fn public_key(&self) -> KemPublicKey {
        KemPublicKey(
            self.0[EMBEDDED_PUBLIC_KEY_OFFSET..EMBEDDED_PUBLIC_KEY_OFFSET + PUBLIC_KEY_LEN]
                .to_vec(),
        )
    }

    /// Whether this private key belongs to `public`.
    pub fn matches(&self, public: &KemPublicKey) -> bool {
        self.public_key() == *public
    }

    /// Recover the shared secret from an encapsulation.
    ///
    /// ML-KEM uses implicit rejection: a wrong key yields an unrelated
    /// secret rather than an error.
    pub fn decapsulate(&self, encapsulation: &Encapsulation) -> Result<SharedSecret> {
        let encoded = Encoded::<DecapsulationKey>::try_from(self.0.as_slice())
            .map_err(|_| CoreError::Decoding("malformed private key".into()))?;
        let dk = DecapsulationKey::from_bytes(&encoded);

        let ct = Ciphertext::<MlKem1024>::try_from(encapsulation.as_bytes())
            .map_err(|_| CoreError::Decoding("malformed encapsulation".into()))?;
        let ss = dk
            .decapsulate(&ct)
            .map_err(|_| CoreError::Decoding("decapsulation failed".into()))?;

        let mut secret = [0u8; SHARED_SECRET_LEN];
        secret.copy_from_slice(ss.as_slice());
        Ok(SharedSecret(secret))
    }
}

impl fmt::Debug for KemPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KemPrivateKey(<redacted>)")
    }
}

/// A KEM ciphertext: the stored half of a recipient wrap.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encapsulation(#[serde(with = "base64_bytes")] Vec<u8>);

impl Encapsulation {
    /// Create from bytes, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ENCAPSULATION_LEN {
            return Err(CoreError::InvalidLength {
                kind: "encapsulation",
                expected: ENCAPSULATION_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Encapsulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encapsulation({} bytes)", self.0.len())
    }
}

/// A 32-byte KEM shared secret. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// An ML-KEM-1024 key pair.
#[derive(Clone)]
pub struct KeyPair {
    pub public: KemPublicKey,
    pub private: KemPrivateKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        let (dk, ek) = MlKem1024::generate(&mut rand::thread_rng());
        Self::from_parts(&dk, &ek)
    }

    /// Deterministic key pair from a seed. Test fixtures only.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let (dk, ek) = MlKem1024::generate(&mut StdRng::from_seed(seed));
        Self::from_parts(&dk, &ek)
    }

    /// Rebuild a pair from a private key alone.
    pub fn from_private(private: KemPrivateKey) -> Self {
        Self {
            public: private.public_key(),
            private,
        }
    }

    fn from_parts(dk: &DecapsulationKey, ek: &EncapsulationKey) -> Self {
        Self {
            public: KemPublicKey(ek.as_bytes().as_slice().to_vec()),
            private: KemPrivateKey(dk.as_bytes().as_slice().to_vec()),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &self.private)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_sizes() {
        let pair = KeyPair::generate();
        assert_eq!(pair.public.as_bytes().len(), PUBLIC_KEY_LEN);
        assert_eq!(pair.private.as_bytes().len(), PRIVATE_KEY_LEN);
    }

    #[test]
    fn test_generated_pairs_differ() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public, b.public);
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let a = KeyPair::from_seed([7; 32]);
        let b = KeyPair::from_seed([7; 32]);
        let c = KeyPair::from_seed([8; 32]);

        assert_eq!(a.public, b.public);
        assert_ne!(a.public, c.public);
    }

    #[test]
    fn test_encapsulate_decapsulate() {
        let pair = KeyPair::generate();
        let (enc, ss) = pair.public.encapsulate().unwrap();
        assert_eq!(enc.len(), ENCAPSULATION_LEN);

        let recovered = pair.private.decapsulate(&enc).unwrap();
        assert_eq!(ss.as_bytes(), recovered.as_bytes());
    }

    #[test]
    fn test_wrong_key_yields_different_secret() {
        let pair = KeyPair::generate();
        let other = KeyPair::generate();
        let (enc, ss) = pair.public.encapsulate().unwrap();

        let wrong = other.private.decapsulate(&enc).unwrap();
        assert_ne!(ss.as_bytes(), wrong.as_bytes());
    }

    #[test]
    fn test_embedded_public_key() {
        let pair = KeyPair::generate();
        assert_eq!(pair.private.public_key(), pair.public);
        assert!(pair.private.matches(&pair.public));
        assert!(!pair.private.matches(&KeyPair::generate().public));

        let rebuilt = KeyPair::from_private(pair.private.clone());
        assert_eq!(rebuilt.public, pair.public);
    }

    #[test]
    fn test_private_key_hex_roundtrip() {
        let pair = KeyPair::generate();
        let hex = pair.private.to_hex();
        assert_eq!(hex.len(), PRIVATE_KEY_LEN * 2);

        let back = KemPrivateKey::from_hex(&hex).unwrap();
        assert_eq!(back.as_bytes(), pair.private.as_bytes());
    }

    #[test]
    fn test_private_key_hex_wrong_length() {
        let err = KemPrivateKey::from_hex(&"ab".repeat(31)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidLength { .. }));

        let odd = "a".repeat(63);
        assert!(KemPrivateKey::from_hex(&odd).is_err());
    }

    #[test]
    fn test_public_key_base64_serde() {
        let pair = KeyPair::generate();
        let json = serde_json::to_string(&pair.public).unwrap();
        assert!(json.starts_with('"'));

        let back: KemPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair.public);

        assert!(serde_json::from_str::<KemPublicKey>("\"AQID\"").is_err());
    }

    #[test]
    fn test_malformed_encapsulation_rejected() {
        assert!(Encapsulation::from_slice(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let pair = KeyPair::generate();
        let debug = format!("{pair:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&pair.private.to_hex()[..32]));
    }
}
