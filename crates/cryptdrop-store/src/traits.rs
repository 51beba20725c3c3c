//! Collaborator traits: the narrow interfaces to the managed backend.
//!
//! The engine never talks to a database directly. It reads public keys
//! from a profile directory, reads and writes encrypted blobs by path,
//! and reads and writes object documents, with batched mutation for
//! key rotation.

use async_trait::async_trait;
use bytes::Bytes;

use cryptdrop_core::{KemPublicKey, ObjectId, UserId};

use crate::documents::{ObjectDocument, UserProfile, WriteBatch};
use crate::error::{Result, StoreError};

/// User profiles, including the public-key directory.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user: &UserId) -> Result<Option<UserProfile>>;

    /// Insert or replace a profile.
    async fn put_profile(&self, profile: &UserProfile) -> Result<()>;
}

/// Encrypted blob storage addressed by path.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_blob(&self, path: &str, data: Bytes) -> Result<()>;

    async fn get_blob(&self, path: &str) -> Result<Option<Bytes>>;

    /// Delete a blob. Returns whether it existed.
    async fn delete_blob(&self, path: &str) -> Result<bool>;
}

/// Object documents.
///
/// # Design Notes
///
/// - **Batched writes**: `commit_batch` applies every operation or none.
/// - **Batch limit**: backends cap batch size; callers split work to
///   `max_batch_size()` and oversized batches fail with `BatchTooLarge`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Single documents
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_object(&self, id: &ObjectId) -> Result<Option<ObjectDocument>>;

    /// Insert or replace a document.
    async fn put_object(&self, doc: &ObjectDocument) -> Result<()>;

    /// Delete a document. Returns whether it existed.
    async fn delete_object(&self, id: &ObjectId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Every document with a wrapped key for `user`, ordered by id.
    async fn objects_shared_with(&self, user: &UserId) -> Result<Vec<ObjectDocument>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Batched mutation
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a batch atomically.
    async fn commit_batch(&self, batch: WriteBatch) -> Result<()>;

    /// Largest batch `commit_batch` accepts.
    fn max_batch_size(&self) -> usize;
}

/// Extension trait for common profile lookups.
pub trait ProfileStoreExt: ProfileStore {
    /// Look up and decode a user's published public key.
    fn public_key_for(
        &self,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<KemPublicKey>>> + Send;
}

impl<S: ProfileStore + ?Sized> ProfileStoreExt for S {
    async fn public_key_for(&self, user: &UserId) -> Result<Option<KemPublicKey>> {
        let Some(profile) = self.get_profile(user).await? else {
            return Ok(None);
        };
        KemPublicKey::from_base64(&profile.public_key)
            .map(Some)
            .map_err(|e| StoreError::InvalidData(format!("public key for {user}: {e}")))
    }
}
