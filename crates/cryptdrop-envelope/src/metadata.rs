//! Encryption of small metadata fields under an object's content secret.
//!
//! Names are UTF-8. Sizes are encrypted as the decimal string of a `u64`
//! so that both fields share one representation.

use cryptdrop_core::{EncryptedBlob, SymmetricKey};

use crate::error::{EnvelopeError, Result};

/// Encrypt a string field.
pub fn encrypt_field(value: &str, secret: &SymmetricKey) -> Result<EncryptedBlob> {
    Ok(secret.encrypt(value.as_bytes())?)
}

/// Decrypt a string field.
pub fn decrypt_field(blob: &EncryptedBlob, secret: &SymmetricKey) -> Result<String> {
    let bytes = secret.decrypt(blob)?;
    String::from_utf8(bytes).map_err(|_| EnvelopeError::InvalidMetadata("field is not UTF-8".into()))
}

/// Encrypt an object name.
pub fn encrypt_name(name: &str, secret: &SymmetricKey) -> Result<EncryptedBlob> {
    encrypt_field(name, secret)
}

/// Decrypt an object name.
pub fn decrypt_name(blob: &EncryptedBlob, secret: &SymmetricKey) -> Result<String> {
    decrypt_field(blob, secret)
}

/// Encrypt an object size.
pub fn encrypt_size(size: u64, secret: &SymmetricKey) -> Result<EncryptedBlob> {
    encrypt_field(&size.to_string(), secret)
}

/// Decrypt an object size.
pub fn decrypt_size(blob: &EncryptedBlob, secret: &SymmetricKey) -> Result<u64> {
    let text = decrypt_field(blob, secret)?;
    text.parse::<u64>()
        .map_err(|_| EnvelopeError::InvalidMetadata(format!("size is not a number: {text:?}")))
}
