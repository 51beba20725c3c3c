//! In-memory implementation of the collaborator traits.
//!
//! This is primarily for tests and headless use. It enforces the same
//! batch limit and atomicity as a real backend but keeps everything in
//! memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use cryptdrop_core::{ObjectId, UserId};

use crate::documents::{ObjectDocument, UserProfile, WriteBatch, WriteOp};
use crate::error::{Result, StoreError};
use crate::traits::{DocumentStore, ObjectStore, ProfileStore};

/// Default batch limit, matching common document databases.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    max_batch_size: usize,
}

#[derive(Default)]
struct MemoryStoreInner {
    profiles: HashMap<UserId, UserProfile>,
    blobs: HashMap<String, Bytes>,
    objects: BTreeMap<ObjectId, ObjectDocument>,

    /// Commits still to fail, for fault injection.
    failing_commits: usize,

    /// Profile writes still to fail.
    failing_profile_writes: usize,

    /// Successful batch commits.
    commits: usize,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::with_max_batch_size(DEFAULT_MAX_BATCH_SIZE)
    }

    /// Create with a custom batch limit.
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Make the next `n` calls to `commit_batch` fail without applying.
    pub fn fail_next_commits(&self, n: usize) {
        if let Ok(mut inner) = self.inner.write() {
            inner.failing_commits = n;
        }
    }

    /// Make the next `n` calls to `put_profile` fail without applying.
    pub fn fail_next_profile_writes(&self, n: usize) {
        if let Ok(mut inner) = self.inner.write() {
            inner.failing_profile_writes = n;
        }
    }

    /// Number of successfully applied batches.
    pub fn commit_count(&self) -> usize {
        self.inner.read().map(|i| i.commits).unwrap_or(0)
    }

    /// Number of stored documents.
    pub fn object_count(&self) -> usize {
        self.inner.read().map(|i| i.objects.len()).unwrap_or(0)
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.inner.read().map(|i| i.blobs.len()).unwrap_or(0)
    }

    /// Overwrite a stored blob in place. Used to simulate tampering.
    pub fn corrupt_blob(&self, path: &str, data: Bytes) -> bool {
        match self.inner.write() {
            Ok(mut inner) => inner.blobs.insert(path.to_string(), data).is_some(),
            Err(_) => false,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    /// Check that every operation can apply before touching anything.
    fn validate(&self, ops: &[WriteOp]) -> Result<()> {
        // Objects created earlier in the same batch count as present.
        let mut present: BTreeMap<&ObjectId, bool> = BTreeMap::new();
        for op in ops {
            let id = op.object_id();
            let exists = *present
                .entry(id)
                .or_insert_with(|| self.objects.contains_key(id));
            match op {
                WriteOp::SetWrappedKey { .. } | WriteOp::RemoveWrappedKey { .. } if !exists => {
                    return Err(StoreError::NotFound(format!("object {id}")));
                }
                WriteOp::PutObject(_) => {
                    present.insert(id, true);
                }
                WriteOp::DeleteObject(_) => {
                    present.insert(id, false);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::SetWrappedKey {
                object,
                user,
                wrapped,
            } => {
                if let Some(doc) = self.objects.get_mut(&object) {
                    doc.encrypted_keys.insert(user, wrapped);
                }
            }
            WriteOp::RemoveWrappedKey { object, user } => {
                if let Some(doc) = self.objects.get_mut(&object) {
                    doc.encrypted_keys.remove(&user);
                }
            }
            WriteOp::PutObject(doc) => {
                self.objects.insert(doc.id.clone(), doc);
            }
            WriteOp::DeleteObject(id) => {
                self.objects.remove(&id);
            }
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, user: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.read()?.profiles.get(user).cloned())
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut inner = self.write()?;
        if inner.failing_profile_writes > 0 {
            inner.failing_profile_writes -= 1;
            return Err(StoreError::Backend("injected profile write failure".into()));
        }
        inner.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_blob(&self, path: &str, data: Bytes) -> Result<()> {
        self.write()?.blobs.insert(path.to_string(), data);
        Ok(())
    }

    async fn get_blob(&self, path: &str) -> Result<Option<Bytes>> {
        Ok(self.read()?.blobs.get(path).cloned())
    }

    async fn delete_blob(&self, path: &str) -> Result<bool> {
        Ok(self.write()?.blobs.remove(path).is_some())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_object(&self, id: &ObjectId) -> Result<Option<ObjectDocument>> {
        Ok(self.read()?.objects.get(id).cloned())
    }

    async fn put_object(&self, doc: &ObjectDocument) -> Result<()> {
        self.write()?.objects.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn delete_object(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.write()?.objects.remove(id).is_some())
    }

    async fn objects_shared_with(&self, user: &UserId) -> Result<Vec<ObjectDocument>> {
        Ok(self
            .read()?
            .objects
            .values()
            .filter(|doc| doc.is_shared_with(user))
            .cloned()
            .collect())
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<()> {
        if batch.len() > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size: batch.len(),
                max: self.max_batch_size,
            });
        }

        let mut inner = self.write()?;
        if inner.failing_commits > 0 {
            inner.failing_commits -= 1;
            return Err(StoreError::Backend("injected commit failure".into()));
        }

        inner.validate(batch.ops())?;

        let size = batch.len();
        for op in batch.into_ops() {
            inner.apply(op);
        }
        inner.commits += 1;

        debug!(ops = size, "committed batch");
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
