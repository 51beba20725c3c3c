//! String encodings used on the wire.
//!
//! Blobs, nonces and public keys travel as standard (padded) base64.
//! Private keys in key files and digests use lowercase hex.
//!
//! The `base64_bytes` and `base64_array` modules are `serde(with = ...)`
//! adapters so wire structs can keep raw byte fields.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{CoreError, Result};

/// Encode bytes as standard base64.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64. Surrounding whitespace is ignored.
pub fn from_base64(s: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(s.trim())
        .map_err(|e| CoreError::Decoding(format!("invalid base64: {e}")))
}

/// Encode bytes as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex. Surrounding whitespace is ignored.
pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s.trim()).map_err(|e| CoreError::Decoding(format!("invalid hex: {e}")))
}

/// Copy a slice into a fixed-size array, checking the length.
pub fn fixed<const N: usize>(bytes: &[u8], kind: &'static str) -> Result<[u8; N]> {
    if bytes.len() != N {
        return Err(CoreError::InvalidLength {
            kind,
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(bytes);
    Ok(arr)
}

/// Serde adapter: `Vec<u8>` as a base64 string.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter: `[u8; N]` as a base64 string of exactly `N` bytes.
pub mod base64_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = super::from_base64(&s).map_err(serde::de::Error::custom)?;
        super::fixed::<N>(&bytes, "base64 field").map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wire {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(with = "base64_array")]
        tag: [u8; 4],
    }

    #[test]
    fn test_base64_fields_in_json() {
        let wire = Wire {
            data: b"hello".to_vec(),
            tag: [1, 2, 3, 4],
        };
        let json = serde_json::to_string(&wire).unwrap();
        assert_eq!(json, r#"{"data":"aGVsbG8=","tag":"AQIDBA=="}"#);

        let back: Wire = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wire);
    }

    #[test]
    fn test_base64_array_rejects_wrong_length() {
        let json = r#"{"data":"","tag":"AQID"}"#;
        assert!(serde_json::from_str::<Wire>(json).is_err());
    }

    #[test]
    fn test_fixed_length_check() {
        assert!(fixed::<3>(&[1, 2, 3], "test").is_ok());
        let err = fixed::<3>(&[1, 2], "test").unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidLength {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_hex_ignores_surrounding_whitespace() {
        assert_eq!(from_hex("  0a0b\n").unwrap(), vec![0x0a, 0x0b]);
        assert!(from_hex("0g").is_err());
    }
}
