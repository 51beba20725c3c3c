//! Encrypted objects and the service that produces and opens them.
//!
//! An [`EncryptedObject`] holds three blobs (content, name, size) under a
//! single content secret plus one [`WrappedKey`] per recipient. Every
//! wrapped key opens to that same secret. Recipient changes rewrite only
//! the key map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cryptdrop_core::{
    Digest, EncryptedBlob, KemPrivateKey, KemPublicKey, ObjectId, SymmetricKey, UserId,
};

use crate::cache::SecretCache;
use crate::error::{EnvelopeError, Result};
use crate::metadata;
use crate::wrap::{unwrap_for_recipient, wrap_for_recipient, WrappedKey};

/// Wrapped keys by recipient.
///
/// Serialized as `{user_id: encoded WrappedKey}`, the `encryptedKeys` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<UserId, String>", into = "BTreeMap<UserId, String>")]
pub struct RecipientKeys(BTreeMap<UserId, WrappedKey>);

impl RecipientKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user: &UserId) -> Option<&WrappedKey> {
        self.0.get(user)
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.0.contains_key(user)
    }

    /// Insert or replace a user's wrapped key.
    pub fn insert(&mut self, user: UserId, key: WrappedKey) -> Option<WrappedKey> {
        self.0.insert(user, key)
    }

    pub fn remove(&mut self, user: &UserId) -> Option<WrappedKey> {
        self.0.remove(user)
    }

    /// Recipients in sorted order.
    pub fn users(&self) -> Vec<UserId> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &WrappedKey)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode every entry for storage.
    pub fn encode(&self) -> BTreeMap<UserId, String> {
        self.0.iter().map(|(u, k)| (u.clone(), k.encode())).collect()
    }

    /// Decode a stored map. Any malformed entry fails the whole map.
    pub fn decode(map: &BTreeMap<UserId, String>) -> Result<Self> {
        map.iter()
            .map(|(u, s)| Ok((u.clone(), WrappedKey::decode(s)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Self)
    }
}

impl TryFrom<BTreeMap<UserId, String>> for RecipientKeys {
    type Error = EnvelopeError;

    fn try_from(map: BTreeMap<UserId, String>) -> Result<Self> {
        Self::decode(&map)
    }
}

impl From<RecipientKeys> for BTreeMap<UserId, String> {
    fn from(keys: RecipientKeys) -> Self {
        keys.encode()
    }
}

/// A storable encrypted object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedObject {
    pub id: ObjectId,
    pub owner: UserId,
    pub encrypted_content: EncryptedBlob,
    pub encrypted_name: EncryptedBlob,
    pub encrypted_size: EncryptedBlob,
    pub encrypted_keys: RecipientKeys,
}

impl EncryptedObject {
    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("JSON serialization failed")
    }

    /// Deserialize from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Serialization(e.to_string()))
    }
}

/// Plaintext recovered from an [`EncryptedObject`].
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptedObject {
    pub content: Vec<u8>,
    pub name: String,
    pub size: u64,
}

impl std::fmt::Debug for DecryptedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedObject")
            .field("content", &format_args!("{} bytes", self.content.len()))
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

/// Outcome of re-wrapping one recipient entry under a new key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrap {
    /// The new private key already opens the entry.
    AlreadyCurrent,
    /// A fresh entry for the new public key, verified to open to the same secret.
    Rewrapped(WrappedKey),
}

/// Orchestrates symmetric encryption, recipient wrapping and metadata.
#[derive(Debug, Default)]
pub struct ContentEncryptionService {
    cache: SecretCache,
}

impl ContentEncryptionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// The secret cache backing repeated reads.
    pub fn cache(&self) -> &SecretCache {
        &self.cache
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Objects
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt content and metadata under a fresh secret for the owner and
    /// every listed recipient.
    ///
    /// The owner is always a recipient even if absent from `recipients`.
    /// If the owner also appears in `recipients`, `owner_public` wins.
    pub fn encrypt_for_recipients(
        &self,
        owner: &UserId,
        owner_public: &KemPublicKey,
        content: &[u8],
        name: &str,
        size: u64,
        recipients: &BTreeMap<UserId, KemPublicKey>,
    ) -> Result<EncryptedObject> {
        let secret = SymmetricKey::generate();

        let encrypted_content = secret.encrypt(content)?;
        let encrypted_name = metadata::encrypt_name(name, &secret)?;
        let encrypted_size = metadata::encrypt_size(size, &secret)?;

        let mut keys = RecipientKeys::new();
        keys.insert(owner.clone(), wrap_for_recipient(&secret, owner_public)?);
        for (user, public) in recipients.iter().filter(|(u, _)| *u != owner) {
            keys.insert(user.clone(), wrap_for_recipient(&secret, public)?);
        }

        Ok(EncryptedObject {
            id: ObjectId::generate(),
            owner: owner.clone(),
            encrypted_content,
            encrypted_name,
            encrypted_size,
            encrypted_keys: keys,
        })
    }

    /// Open an object as `user`.
    ///
    /// Fails with [`EnvelopeError::NotSharedWithUser`] when there is no entry
    /// for `user`, and with [`EnvelopeError::KeyMismatch`] when the entry
    /// exists but `private` does not open it.
    pub fn decrypt_for_user(
        &self,
        obj: &EncryptedObject,
        user: &UserId,
        private: &KemPrivateKey,
    ) -> Result<DecryptedObject> {
        let secret = self.content_secret(&obj.id, &obj.encrypted_keys, user, private)?;

        let content = secret.decrypt(&obj.encrypted_content)?;
        let name = metadata::decrypt_name(&obj.encrypted_name, &secret)?;
        let size = metadata::decrypt_size(&obj.encrypted_size, &secret)?;

        Ok(DecryptedObject {
            content,
            name,
            size,
        })
    }

    /// Decrypt only the name and size, e.g. for listings.
    pub fn decrypt_metadata(
        &self,
        id: &ObjectId,
        keys: &RecipientKeys,
        encrypted_name: &EncryptedBlob,
        encrypted_size: &EncryptedBlob,
        user: &UserId,
        private: &KemPrivateKey,
    ) -> Result<(String, u64)> {
        let secret = self.content_secret(id, keys, user, private)?;
        Ok((
            metadata::decrypt_name(encrypted_name, &secret)?,
            metadata::decrypt_size(encrypted_size, &secret)?,
        ))
    }

    /// Grant `recipient` access through the granter's own entry.
    pub fn add_recipient(
        &self,
        obj: &mut EncryptedObject,
        granter: &UserId,
        granter_private: &KemPrivateKey,
        recipient: &UserId,
        recipient_public: &KemPublicKey,
    ) -> Result<()> {
        self.grant_access(
            &obj.id,
            &mut obj.encrypted_keys,
            granter,
            granter_private,
            recipient,
            recipient_public,
        )
    }

    /// Delete `user`'s entry and cached secret. Returns whether an entry existed.
    ///
    /// The content secret is not rotated: a removed recipient who kept a
    /// copy of the secret can still open the existing blobs.
    pub fn remove_recipient(&self, obj: &mut EncryptedObject, user: &UserId) -> Result<bool> {
        self.revoke_access(&obj.id, &mut obj.encrypted_keys, &obj.owner, user)
    }

    /// Re-wrap `user`'s entry for a new key pair. Does not modify `obj`.
    pub fn rewrap_for_user(
        &self,
        obj: &EncryptedObject,
        user: &UserId,
        old_private: &KemPrivateKey,
        new_private: &KemPrivateKey,
        new_public: &KemPublicKey,
    ) -> Result<Rewrap> {
        let wrapped = obj
            .encrypted_keys
            .get(user)
            .ok_or_else(|| EnvelopeError::NotSharedWithUser(user.clone()))?;
        self.rewrap_entry(wrapped, old_private, new_private, new_public)
    }

    /// Recipients of an object in sorted order.
    pub fn recipients(&self, obj: &EncryptedObject) -> Vec<UserId> {
        obj.encrypted_keys.users()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key maps
    //
    // The operations below work on a bare key map so callers holding only
    // a stored document never need to fetch the content blob.
    // ─────────────────────────────────────────────────────────────────────────

    /// Recover the content secret for `user`, consulting the cache first.
    pub fn content_secret(
        &self,
        id: &ObjectId,
        keys: &RecipientKeys,
        user: &UserId,
        private: &KemPrivateKey,
    ) -> Result<SymmetricKey> {
        let wrapped = keys
            .get(user)
            .ok_or_else(|| EnvelopeError::NotSharedWithUser(user.clone()))?;

        let binding = cache_binding(wrapped, private);
        if let Some(secret) = self.cache.get(id, user, &binding) {
            return Ok(secret);
        }

        let secret = unwrap_for_recipient(wrapped, private)?;
        self.cache.insert(id, user, binding, secret.clone());
        Ok(secret)
    }

    /// Add or replace `recipient`'s entry, unwrapping through `granter`'s.
    pub fn grant_access(
        &self,
        id: &ObjectId,
        keys: &mut RecipientKeys,
        granter: &UserId,
        granter_private: &KemPrivateKey,
        recipient: &UserId,
        recipient_public: &KemPublicKey,
    ) -> Result<()> {
        let secret = self.content_secret(id, keys, granter, granter_private)?;
        let wrapped = wrap_for_recipient(&secret, recipient_public)?;
        keys.insert(recipient.clone(), wrapped);
        self.cache.evict(id, recipient);
        Ok(())
    }

    /// Remove `user`'s entry. The owner's entry cannot be removed.
    pub fn revoke_access(
        &self,
        id: &ObjectId,
        keys: &mut RecipientKeys,
        owner: &UserId,
        user: &UserId,
    ) -> Result<bool> {
        if user == owner {
            return Err(EnvelopeError::CannotRemoveOwner(user.clone()));
        }
        let existed = keys.remove(user).is_some();
        self.cache.evict(id, user);
        Ok(existed)
    }

    /// Re-wrap one entry for a new key pair.
    ///
    /// Returns [`Rewrap::AlreadyCurrent`] if `new_private` already opens
    /// `wrapped`. Otherwise unwraps with `old_private`, wraps for
    /// `new_public` and checks that the new entry opens to the same secret
    /// before returning it.
    pub fn rewrap_entry(
        &self,
        wrapped: &WrappedKey,
        old_private: &KemPrivateKey,
        new_private: &KemPrivateKey,
        new_public: &KemPublicKey,
    ) -> Result<Rewrap> {
        match unwrap_for_recipient(wrapped, new_private) {
            Ok(_) => return Ok(Rewrap::AlreadyCurrent),
            Err(EnvelopeError::KeyMismatch) => {}
            Err(e) => return Err(e),
        }

        let secret = unwrap_for_recipient(wrapped, old_private)?;
        let rewrapped = wrap_for_recipient(&secret, new_public)?;

        if unwrap_for_recipient(&rewrapped, new_private)? != secret {
            return Err(EnvelopeError::KeyMismatch);
        }
        Ok(Rewrap::Rewrapped(rewrapped))
    }
}

fn cache_binding(wrapped: &WrappedKey, private: &KemPrivateKey) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&wrapped.to_bytes());
    hasher.update(private.public_key().as_bytes());
    Digest::from_bytes(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptdrop_core::KeyPair;

    fn users() -> (UserId, KeyPair, UserId, KeyPair) {
        (
            UserId::new("alice"),
            KeyPair::generate(),
            UserId::new("bob"),
            KeyPair::generate(),
        )
    }

    #[test]
    fn test_owner_always_included() {
        let svc = ContentEncryptionService::new();
        let (alice, a, _, _) = users();

        let obj = svc
            .encrypt_for_recipients(&alice, &a.public, b"private", "p.txt", 7, &BTreeMap::new())
            .unwrap();

        assert_eq!(svc.recipients(&obj), vec![alice.clone()]);
        let opened = svc.decrypt_for_user(&obj, &alice, &a.private).unwrap();
        assert_eq!(opened.content, b"private");
    }

    #[test]
    fn test_owner_in_recipient_map_uses_owner_key() {
        let svc = ContentEncryptionService::new();
        let (alice, a, _, _) = users();
        let stale = KeyPair::generate();

        let mut recipients = BTreeMap::new();
        recipients.insert(alice.clone(), stale.public.clone());
        let obj = svc
            .encrypt_for_recipients(&alice, &a.public, b"x", "x", 1, &recipients)
            .unwrap();

        assert_eq!(obj.encrypted_keys.len(), 1);
        assert!(svc.decrypt_for_user(&obj, &alice, &a.private).is_ok());
    }

    #[test]
    fn test_wrong_key_with_entry_is_key_mismatch() {
        let svc = ContentEncryptionService::new();
        let (alice, a, _, b) = users();

        let obj = svc
            .encrypt_for_recipients(&alice, &a.public, b"x", "x", 1, &BTreeMap::new())
            .unwrap();

        assert!(matches!(
            svc.decrypt_for_user(&obj, &alice, &b.private),
            Err(EnvelopeError::KeyMismatch)
        ));
    }

    #[test]
    fn test_cache_does_not_serve_wrong_key() {
        let svc = ContentEncryptionService::new();
        let (alice, a, _, b) = users();

        let obj = svc
            .encrypt_for_recipients(&alice, &a.public, b"x", "x", 1, &BTreeMap::new())
            .unwrap();

        svc.decrypt_for_user(&obj, &alice, &a.private).unwrap();
        assert_eq!(svc.cache().len(), 1);

        assert!(svc.decrypt_for_user(&obj, &alice, &b.private).is_err());
    }

    #[test]
    fn test_add_and_remove_recipient() {
        let svc = ContentEncryptionService::new();
        let (alice, a, bob, b) = users();

        let mut obj = svc
            .encrypt_for_recipients(&alice, &a.public, b"shared", "s", 6, &BTreeMap::new())
            .unwrap();
        let content_before = obj.encrypted_content.clone();

        svc.add_recipient(&mut obj, &alice, &a.private, &bob, &b.public)
            .unwrap();
        assert_eq!(obj.encrypted_content, content_before);
        assert_eq!(
            svc.decrypt_for_user(&obj, &bob, &b.private).unwrap().content,
            b"shared"
        );

        assert!(svc.remove_recipient(&mut obj, &bob).unwrap());
        assert!(!svc.remove_recipient(&mut obj, &bob).unwrap());
        assert!(matches!(
            svc.decrypt_for_user(&obj, &bob, &b.private),
            Err(EnvelopeError::NotSharedWithUser(_))
        ));
        assert!(svc.decrypt_for_user(&obj, &alice, &a.private).is_ok());
    }

    #[test]
    fn test_cannot_remove_owner() {
        let svc = ContentEncryptionService::new();
        let (alice, a, _, _) = users();
        let mut obj = svc
            .encrypt_for_recipients(&alice, &a.public, b"x", "x", 1, &BTreeMap::new())
            .unwrap();

        assert!(matches!(
            svc.remove_recipient(&mut obj, &alice),
            Err(EnvelopeError::CannotRemoveOwner(_))
        ));
    }

    #[test]
    fn test_non_recipient_cannot_grant() {
        let svc = ContentEncryptionService::new();
        let (alice, a, bob, b) = users();
        let mut obj = svc
            .encrypt_for_recipients(&alice, &a.public, b"x", "x", 1, &BTreeMap::new())
            .unwrap();

        let carol = KeyPair::generate();
        let result = svc.add_recipient(&mut obj, &bob, &b.private, &UserId::new("carol"), &carol.public);
        assert!(matches!(result, Err(EnvelopeError::NotSharedWithUser(_))));
    }

    #[test]
    fn test_rewrap_for_user() {
        let svc = ContentEncryptionService::new();
        let (alice, a, _, _) = users();
        let next = KeyPair::generate();

        let mut obj = svc
            .encrypt_for_recipients(&alice, &a.public, b"rotate", "r", 6, &BTreeMap::new())
            .unwrap();

        let outcome = svc
            .rewrap_for_user(&obj, &alice, &a.private, &next.private, &next.public)
            .unwrap();
        let Rewrap::Rewrapped(new_entry) = outcome else {
            panic!("expected a rewrap");
        };
        obj.encrypted_keys.insert(alice.clone(), new_entry);

        let again = svc
            .rewrap_for_user(&obj, &alice, &a.private, &next.private, &next.public)
            .unwrap();
        assert_eq!(again, Rewrap::AlreadyCurrent);

        svc.cache().clear();
        let opened = svc.decrypt_for_user(&obj, &alice, &next.private).unwrap();
        assert_eq!(opened.content, b"rotate");
    }

    #[test]
    fn test_rewrap_with_wrong_old_key_fails() {
        let svc = ContentEncryptionService::new();
        let (alice, a, _, b) = users();
        let next = KeyPair::generate();

        let obj = svc
            .encrypt_for_recipients(&alice, &a.public, b"x", "x", 1, &BTreeMap::new())
            .unwrap();

        assert!(matches!(
            svc.rewrap_for_user(&obj, &alice, &b.private, &next.private, &next.public),
            Err(EnvelopeError::KeyMismatch)
        ));
    }

    #[test]
    fn test_object_json_uses_encoded_key_map() {
        let svc = ContentEncryptionService::new();
        let (alice, a, _, _) = users();
        let obj = svc
            .encrypt_for_recipients(&alice, &a.public, b"x", "x", 1, &BTreeMap::new())
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&obj.to_json()).unwrap();
        assert!(value["encryptedKeys"]["alice"].is_string());
        assert!(value["encryptedContent"]["nonce"].is_string());

        let back = EncryptedObject::from_json(&obj.to_json()).unwrap();
        assert_eq!(back, obj);
    }
}
