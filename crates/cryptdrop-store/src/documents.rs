//! Record shapes exchanged with the backend.
//!
//! These mirror what the document database holds. Wrapped keys and sealed
//! private keys are opaque strings here; the envelope and unlock crates
//! own their encodings.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use cryptdrop_core::{EncryptedBlob, ObjectId, UserId};

use crate::error::{Result, StoreError};

/// A user's profile as published to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,

    /// ML-KEM public key, standard base64.
    pub public_key: String,

    /// Sealed private key material by unlock method tag.
    #[serde(default)]
    pub sealed_keys: BTreeMap<String, String>,

    /// Passphrase-sealed private keys from before a rotation, kept until
    /// every object has been re-wrapped.
    #[serde(default)]
    pub retired_keys: Vec<String>,
}

impl UserProfile {
    pub fn new(user_id: UserId, public_key: String) -> Self {
        Self {
            user_id,
            public_key,
            sealed_keys: BTreeMap::new(),
            retired_keys: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("JSON serialization failed")
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// An encrypted object's document. The content blob lives in the object
/// store at `content_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDocument {
    pub id: ObjectId,
    pub owner: UserId,
    pub content_path: String,

    /// BLAKE3 hex digest of the stored content blob bytes.
    pub content_digest: String,

    pub encrypted_name: EncryptedBlob,
    pub encrypted_size: EncryptedBlob,

    /// Encoded wrapped keys by recipient.
    pub encrypted_keys: BTreeMap<UserId, String>,

    /// Creation time (Unix ms).
    pub created_at: i64,
}

impl ObjectDocument {
    pub fn is_shared_with(&self, user: &UserId) -> bool {
        self.encrypted_keys.contains_key(user)
    }
}

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or replace one recipient's wrapped key.
    SetWrappedKey {
        object: ObjectId,
        user: UserId,
        wrapped: String,
    },
    /// Delete one recipient's wrapped key.
    RemoveWrappedKey { object: ObjectId, user: UserId },
    /// Insert or replace a whole document.
    PutObject(ObjectDocument),
    /// Delete a document.
    DeleteObject(ObjectId),
}

impl WriteOp {
    /// The object this operation touches.
    pub fn object_id(&self) -> &ObjectId {
        match self {
            WriteOp::SetWrappedKey { object, .. } => object,
            WriteOp::RemoveWrappedKey { object, .. } => object,
            WriteOp::PutObject(doc) => &doc.id,
            WriteOp::DeleteObject(id) => id,
        }
    }
}

/// A group of writes applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn set_wrapped_key(&mut self, object: ObjectId, user: UserId, wrapped: String) -> &mut Self {
        self.push(WriteOp::SetWrappedKey {
            object,
            user,
            wrapped,
        })
    }

    pub fn remove_wrapped_key(&mut self, object: ObjectId, user: UserId) -> &mut Self {
        self.push(WriteOp::RemoveWrappedKey { object, user })
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Distinct objects touched by this batch.
    pub fn objects(&self) -> BTreeSet<ObjectId> {
        self.ops.iter().map(|op| op.object_id().clone()).collect()
    }
}
