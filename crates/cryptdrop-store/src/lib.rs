//! # cryptdrop Store
//!
//! Narrow interfaces to the managed backend the engine runs against.
//!
//! ## Overview
//!
//! Persistence, the document schema and network transport belong to the
//! host application. The engine only needs three capabilities, expressed
//! as async traits:
//!
//! - [`ProfileStore`] - user profiles, including the public-key directory
//! - [`ObjectStore`] - encrypted blobs addressed by path
//! - [`DocumentStore`] - object documents with batched, atomic mutation
//!
//! [`MemoryStore`] implements all three for tests and headless use.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cryptdrop_core::UserId;
//! use cryptdrop_store::{MemoryStore, ProfileStoreExt};
//!
//! async fn example() {
//!     let store = MemoryStore::new();
//!     let pk = store.public_key_for(&UserId::new("alice")).await.unwrap();
//!     assert!(pk.is_none());
//! }
//! ```

pub mod documents;
pub mod error;
pub mod memory;
pub mod traits;

pub use documents::{ObjectDocument, UserProfile, WriteBatch, WriteOp};
pub use error::{Result, StoreError};
pub use memory::{MemoryStore, DEFAULT_MAX_BATCH_SIZE};
pub use traits::{DocumentStore, ObjectStore, ProfileStore, ProfileStoreExt};
