//! # cryptdrop
//!
//! Post-quantum, multi-recipient encrypted object storage.
//!
//! ## Overview
//!
//! Every object is encrypted once under a random content secret, and that
//! secret is wrapped separately for each recipient's ML-KEM-1024 public
//! key. Private keys never leave the device unsealed; they are unlocked
//! with a passphrase, a biometric or hardware authenticator, or a key file,
//! and held in memory until the session expires.
//!
//! ## Crates
//!
//! - [`cryptdrop_core`] - primitives: KEM, AEAD, hashing, identifiers
//! - [`cryptdrop_envelope`] - wrapped keys and encrypted objects
//! - [`cryptdrop_unlock`] - unlock strategies and key custody
//! - [`cryptdrop_store`] - backend interfaces and the in-memory store
//! - [`cryptdrop_rotation`] - resumable key-rotation migration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cryptdrop::{Vault, VaultConfig};
//! use cryptdrop_core::{CancelToken, UserId};
//! use cryptdrop_store::MemoryStore;
//! use cryptdrop_unlock::UnlockStrategy;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let vault = Vault::create_account(
//!         store,
//!         UserId::new("alice"),
//!         "correct horse battery staple",
//!         VaultConfig::default(),
//!     )
//!     .await?;
//!
//!     vault
//!         .unlock(
//!             &UnlockStrategy::passphrase("correct horse battery staple"),
//!             false,
//!             &CancelToken::never(),
//!         )
//!         .await?;
//!
//!     let id = vault.upload(b"hello", "note.txt").await?;
//!     let note = vault.download(&id).await?;
//!     assert_eq!(note.content, b"hello");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod vault;

pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use vault::{Backend, ObjectSummary, Vault};

// Re-export the layers for convenience
pub use cryptdrop_core;
pub use cryptdrop_envelope;
pub use cryptdrop_rotation;
pub use cryptdrop_store;
pub use cryptdrop_unlock;
