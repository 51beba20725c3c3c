//! # cryptdrop Core
//!
//! Pure primitives for cryptdrop: key-encapsulation key pairs, authenticated
//! symmetric encryption, digests, and the string encodings used on the wire.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over key material and ciphertexts.
//!
//! ## Key Types
//!
//! - [`KeyPair`] - An ML-KEM-1024 key pair (public + private key bytes)
//! - [`SymmetricKey`] - A 256-bit XChaCha20-Poly1305 key (content secrets, wrap keys)
//! - [`EncryptedBlob`] - Output of one AEAD operation: ciphertext + nonce
//! - [`Digest`] - A BLAKE3 digest used for integrity checks and cache keys
//! - [`UserId`] / [`ObjectId`] - Identifiers for accounts and stored objects
//!
//! ## Wire format
//!
//! Byte strings cross the wire as standard base64 (blobs, public keys) or hex
//! (private keys in key files, digests). See the [`encoding`] module.

pub mod aead;
pub mod cancel;
pub mod digest;
pub mod encoding;
pub mod error;
pub mod kem;
pub mod types;

pub use aead::{decrypt_symmetric, encrypt_symmetric, BlobNonce, EncryptedBlob, SymmetricKey};
pub use cancel::{CancelHandle, CancelToken};
pub use digest::{hash, Digest};
pub use error::{CoreError, Result};
pub use kem::{
    Encapsulation, KemPrivateKey, KemPublicKey, KeyPair, SharedSecret, ENCAPSULATION_LEN,
    PRIVATE_KEY_LEN, PUBLIC_KEY_LEN, SHARED_SECRET_LEN,
};
pub use types::{ObjectId, UserId};
