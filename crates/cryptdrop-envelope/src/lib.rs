//! # cryptdrop Envelope
//!
//! Multi-recipient envelope encryption.
//!
//! ## Encryption Model
//!
//! Each object is encrypted once under a fresh random content secret:
//!
//! 1. **Content secret**: an XChaCha20-Poly1305 key that encrypts the
//!    content, the name and the size
//! 2. **Wrapped keys**: the content secret wrapped separately for every
//!    recipient's ML-KEM-1024 public key
//!
//! This allows:
//! - Adding a recipient without re-encrypting content
//! - Removing a recipient by deleting one map entry
//! - Re-wrapping entries for a new key pair during rotation
//!
//! Removing a recipient does not rotate the content secret. Anyone who
//! already recovered it can still open the existing blobs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use cryptdrop_core::{KeyPair, UserId};
//! use cryptdrop_envelope::ContentEncryptionService;
//!
//! let svc = ContentEncryptionService::new();
//! let owner = KeyPair::generate();
//! let alice = UserId::new("alice");
//!
//! let obj = svc
//!     .encrypt_for_recipients(&alice, &owner.public, b"hello", "note.txt", 5, &BTreeMap::new())
//!     .unwrap();
//! let opened = svc.decrypt_for_user(&obj, &alice, &owner.private).unwrap();
//! assert_eq!(opened.name, "note.txt");
//! ```

pub mod cache;
pub mod error;
pub mod metadata;
pub mod object;
pub mod wrap;

pub use cache::SecretCache;
pub use error::{EnvelopeError, Result};
pub use metadata::{decrypt_name, decrypt_size, encrypt_name, encrypt_size};
pub use object::{
    ContentEncryptionService, DecryptedObject, EncryptedObject, RecipientKeys, Rewrap,
};
pub use wrap::{unwrap_for_recipient, wrap_for_recipient, WrappedKey, WRAP_CONTEXT};
