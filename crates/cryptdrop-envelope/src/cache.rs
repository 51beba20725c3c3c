//! In-memory cache of unwrapped content secrets.
//!
//! Entries are keyed by `(object, user)` and bound to the digest of the
//! wrapped key and the caller's public key. A hit is only served when
//! both still match, so a replaced wrapped key or a different private key
//! falls through to a real unwrap.

use std::collections::HashMap;
use std::sync::RwLock;

use cryptdrop_core::{Digest, ObjectId, SymmetricKey, UserId};

struct Entry {
    binding: Digest,
    secret: SymmetricKey,
}

/// Per-user cache of content secrets. Process memory only.
#[derive(Default)]
pub struct SecretCache {
    entries: RwLock<HashMap<(ObjectId, UserId), Entry>>,
}

impl SecretCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a secret, returning it only if `binding` matches.
    pub fn get(&self, object: &ObjectId, user: &UserId, binding: &Digest) -> Option<SymmetricKey> {
        let entries = self.entries.read().ok()?;
        entries
            .get(&(object.clone(), user.clone()))
            .filter(|e| e.binding == *binding)
            .map(|e| e.secret.clone())
    }

    pub fn insert(&self, object: &ObjectId, user: &UserId, binding: Digest, secret: SymmetricKey) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((object.clone(), user.clone()), Entry { binding, secret });
        }
    }

    /// Drop the entry for one user on one object.
    pub fn evict(&self, object: &ObjectId, user: &UserId) -> bool {
        self.entries
            .write()
            .map(|mut e| e.remove(&(object.clone(), user.clone())).is_some())
            .unwrap_or(false)
    }

    /// Drop every entry for an object.
    pub fn evict_object(&self, object: &ObjectId) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|(o, _), _| o != object);
        }
    }

    /// Drop every entry for a user, e.g. on lock or key rotation.
    pub fn evict_user(&self, user: &UserId) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|(_, u), _| u != user);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCache")
            .field("entries", &self.len())
            .finish()
    }
}
