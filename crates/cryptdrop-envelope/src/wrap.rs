//! Per-recipient key wrapping via ML-KEM.
//!
//! One content secret is generated per object and wrapped independently
//! for each recipient. Adding or removing a recipient touches only that
//! recipient's wrapped key; the content blobs never change.
//!
//! Construction:
//!
//! ```text
//! (encapsulation, shared) = ML-KEM-1024.Encaps(recipient_pk)
//! wrap_key = BLAKE3.derive_key(WRAP_CONTEXT, shared || BLAKE3(encapsulation))
//! wrapped_secret = XChaCha20-Poly1305(wrap_key, content_secret)
//! ```

use serde::{Deserialize, Serialize};

use cryptdrop_core::{
    encoding, Encapsulation, EncryptedBlob, KemPrivateKey, KemPublicKey, SymmetricKey,
};

use crate::error::{EnvelopeError, Result};

/// Key-derivation context for recipient wrap keys.
pub const WRAP_CONTEXT: &str = "cryptdrop 2024 recipient wrap v1";

/// Current wrapped-key format version.
pub const WRAPPED_KEY_VERSION: u8 = 1;

/// A content secret wrapped for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Format version.
    pub version: u8,

    /// ML-KEM ciphertext for the recipient's public key.
    pub encapsulation: Encapsulation,

    /// The content secret, encrypted under the derived wrap key.
    pub wrapped_secret: EncryptedBlob,
}

impl WrappedKey {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: Self = ciborium::from_reader(bytes)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        key.validate()?;
        Ok(key)
    }

    /// Encode for the `encryptedKeys` map: base64 of the CBOR bytes.
    pub fn encode(&self) -> String {
        encoding::to_base64(&self.to_bytes())
    }

    /// Decode an `encryptedKeys` map value.
    pub fn decode(s: &str) -> Result<Self> {
        let bytes =
            encoding::from_base64(s).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Hex of the CBOR bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parse from hex of the CBOR bytes.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// BLAKE3 digest of the CBOR encoding.
    pub fn digest(&self) -> cryptdrop_core::Digest {
        cryptdrop_core::hash(&self.to_bytes())
    }

    fn validate(&self) -> Result<()> {
        if self.version != WRAPPED_KEY_VERSION {
            return Err(EnvelopeError::Malformed(format!(
                "unsupported version {}",
                self.version
            )));
        }
        Encapsulation::from_slice(self.encapsulation.as_bytes())
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        Ok(())
    }
}

fn derive_wrap_key(shared: &[u8], encapsulation: &Encapsulation) -> SymmetricKey {
    let binding = blake3::hash(encapsulation.as_bytes());
    SymmetricKey::derive(WRAP_CONTEXT, &[shared, binding.as_bytes()])
}

/// Wrap `content_secret` for the holder of `recipient`'s private key.
pub fn wrap_for_recipient(
    content_secret: &SymmetricKey,
    recipient: &KemPublicKey,
) -> Result<WrappedKey> {
    let (encapsulation, shared) = recipient.encapsulate()?;
    let wrap_key = derive_wrap_key(shared.as_bytes(), &encapsulation);
    let wrapped_secret = wrap_key.encrypt(content_secret.as_bytes())?;

    Ok(WrappedKey {
        version: WRAPPED_KEY_VERSION,
        encapsulation,
        wrapped_secret,
    })
}

/// Recover the content secret with the recipient's private key.
///
/// ML-KEM decapsulation with the wrong key silently yields a different
/// shared secret, so a wrong key surfaces as an AEAD failure here and is
/// reported as [`EnvelopeError::KeyMismatch`].
pub fn unwrap_for_recipient(wrapped: &WrappedKey, private: &KemPrivateKey) -> Result<SymmetricKey> {
    wrapped.validate()?;

    let shared = private
        .decapsulate(&wrapped.encapsulation)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    let wrap_key = derive_wrap_key(shared.as_bytes(), &wrapped.encapsulation);

    let secret = zeroize::Zeroizing::new(
        wrap_key
            .decrypt(&wrapped.wrapped_secret)
            .map_err(|_| EnvelopeError::KeyMismatch)?,
    );

    SymmetricKey::from_slice(&secret).map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptdrop_core::KeyPair;

    #[test]
    fn test_wrap_unwrap() {
        let recipient = KeyPair::generate();
        let secret = SymmetricKey::generate();

        let wrapped = wrap_for_recipient(&secret, &recipient.public).unwrap();
        let recovered = unwrap_for_recipient(&wrapped, &recipient.private).unwrap();

        assert_eq!(recovered, secret);
    }

    #[test]
    fn test_wrong_recipient_is_key_mismatch() {
        let recipient = KeyPair::generate();
        let stranger = KeyPair::generate();
        let secret = SymmetricKey::generate();

        let wrapped = wrap_for_recipient(&secret, &recipient.public).unwrap();
        let result = unwrap_for_recipient(&wrapped, &stranger.private);

        assert!(matches!(result, Err(EnvelopeError::KeyMismatch)));
    }

    #[test]
    fn test_wraps_are_randomized() {
        let recipient = KeyPair::generate();
        let secret = SymmetricKey::generate();

        let a = wrap_for_recipient(&secret, &recipient.public).unwrap();
        let b = wrap_for_recipient(&secret, &recipient.public).unwrap();
        assert_ne!(a.encapsulation, b.encapsulation);
    }

    #[test]
    fn test_encode_decode() {
        let recipient = KeyPair::generate();
        let wrapped = wrap_for_recipient(&SymmetricKey::generate(), &recipient.public).unwrap();

        let encoded = wrapped.encode();
        assert_eq!(WrappedKey::decode(&encoded).unwrap(), wrapped);

        let hex = wrapped.to_hex();
        assert_eq!(WrappedKey::from_hex(&hex).unwrap(), wrapped);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            WrappedKey::decode("not base64!"),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            WrappedKey::decode("AQID"),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let recipient = KeyPair::generate();
        let mut wrapped = wrap_for_recipient(&SymmetricKey::generate(), &recipient.public).unwrap();
        wrapped.version = 9;

        assert!(matches!(
            WrappedKey::from_bytes(&wrapped.to_bytes()),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            unwrap_for_recipient(&wrapped, &recipient.private),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_tampered_secret_is_key_mismatch() {
        let recipient = KeyPair::generate();
        let mut wrapped = wrap_for_recipient(&SymmetricKey::generate(), &recipient.public).unwrap();
        wrapped.wrapped_secret.ciphertext[3] ^= 0xff;

        assert!(matches!(
            unwrap_for_recipient(&wrapped, &recipient.private),
            Err(EnvelopeError::KeyMismatch)
        ));
    }
}
