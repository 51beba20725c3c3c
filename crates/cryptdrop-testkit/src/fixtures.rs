//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use cryptdrop::{Vault, VaultConfig};
use cryptdrop_core::{hash, CancelToken, KemPublicKey, KeyPair, UserId};
use cryptdrop_envelope::{ContentEncryptionService, DecryptedObject, EncryptedObject};
use cryptdrop_store::{
    DocumentStore, MemoryStore, ObjectDocument, ObjectStore, ProfileStore, UserProfile,
};
use cryptdrop_unlock::{KdfParams, UnlockStrategy};

/// A user with a key pair and a handle on a shared memory store.
pub struct TestFixture {
    pub user: UserId,
    pub keys: KeyPair,
    pub store: Arc<MemoryStore>,
    pub service: ContentEncryptionService,
}

impl TestFixture {
    /// Create a fixture with a random key pair and its own store.
    pub fn new(name: &str) -> Self {
        Self::from_keys(name, KeyPair::generate())
    }

    /// Create with a deterministic key pair from seed.
    pub fn with_seed(name: &str, seed: [u8; 32]) -> Self {
        Self::from_keys(name, KeyPair::from_seed(seed))
    }

    fn from_keys(name: &str, keys: KeyPair) -> Self {
        Self {
            user: UserId::new(name),
            keys,
            store: Arc::new(MemoryStore::new()),
            service: ContentEncryptionService::new(),
        }
    }

    /// Use `store` instead of a private one.
    pub fn with_store(mut self, store: Arc<MemoryStore>) -> Self {
        self.store = store;
        self
    }

    pub fn public_key(&self) -> KemPublicKey {
        self.keys.public.clone()
    }

    /// Encrypt for this user plus `recipients`.
    pub fn encrypt(
        &self,
        content: &[u8],
        name: &str,
        recipients: &[&TestFixture],
    ) -> EncryptedObject {
        let keys: BTreeMap<UserId, KemPublicKey> = recipients
            .iter()
            .map(|r| (r.user.clone(), r.public_key()))
            .collect();
        self.service
            .encrypt_for_recipients(
                &self.user,
                &self.keys.public,
                content,
                name,
                content.len() as u64,
                &keys,
            )
            .expect("encryption failed")
    }

    /// Decrypt as this user.
    pub fn decrypt(&self, obj: &EncryptedObject) -> cryptdrop_envelope::Result<DecryptedObject> {
        self.service.decrypt_for_user(obj, &self.user, &self.keys.private)
    }

    /// Publish a profile carrying only the public key.
    pub async fn publish(&self) -> cryptdrop_store::Result<()> {
        self.store
            .put_profile(&UserProfile::new(self.user.clone(), self.keys.public.to_base64()))
            .await
    }

    /// Write an encrypted object to the store the way an upload does.
    pub async fn store_object(
        &self,
        obj: &EncryptedObject,
    ) -> cryptdrop_store::Result<ObjectDocument> {
        let blob = Bytes::from(
            serde_json::to_vec(&obj.encrypted_content).expect("JSON serialization failed"),
        );
        let doc = ObjectDocument {
            id: obj.id.clone(),
            owner: obj.owner.clone(),
            content_path: format!("objects/{}/{}", obj.owner, obj.id),
            content_digest: hash(&blob).to_hex(),
            encrypted_name: obj.encrypted_name.clone(),
            encrypted_size: obj.encrypted_size.clone(),
            encrypted_keys: obj.encrypted_keys.encode(),
            created_at: 0,
        };
        self.store.put_blob(&doc.content_path, blob).await?;
        self.store.put_object(&doc).await?;
        Ok(doc)
    }
}

/// Create fixtures named `user-0`, `user-1`, ... sharing one store.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    let store = Arc::new(MemoryStore::new());
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(&format!("user-{i}"), seed).with_store(store.clone())
        })
        .collect()
}

/// Vault configuration with the cheapest passphrase KDF.
pub fn fast_config() -> VaultConfig {
    VaultConfig::default().with_kdf(KdfParams::minimal())
}

/// Create an account whose passphrase is its name, and unlock it.
pub async fn unlocked_vault(
    store: Arc<MemoryStore>,
    name: &str,
) -> cryptdrop::Result<Vault<MemoryStore>> {
    let vault = Vault::create_account(store, UserId::new(name), name, fast_config()).await?;
    vault
        .unlock(&UnlockStrategy::passphrase(name), false, &CancelToken::never())
        .await?;
    Ok(vault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptdrop_envelope::EnvelopeError;
    use cryptdrop_store::ProfileStoreExt;

    #[test]
    fn test_seeded_fixtures_are_deterministic() {
        let a = multi_party_fixtures(3);
        let b = multi_party_fixtures(3);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.public_key(), y.public_key());
        }
        assert_ne!(a[0].public_key(), a[1].public_key());
    }

    #[test]
    fn test_fixture_sharing() {
        let parties = multi_party_fixtures(3);
        let obj = parties[0].encrypt(b"hello", "note.txt", &[&parties[1]]);

        assert_eq!(parties[0].decrypt(&obj).unwrap().content, b"hello");
        assert_eq!(parties[1].decrypt(&obj).unwrap().name, "note.txt");
        assert!(matches!(
            parties[2].decrypt(&obj),
            Err(EnvelopeError::NotSharedWithUser(_))
        ));
    }

    #[tokio::test]
    async fn test_store_object_is_listed_for_recipients() {
        let parties = multi_party_fixtures(2);
        for p in &parties {
            p.publish().await.unwrap();
        }
        let obj = parties[0].encrypt(b"x", "x", &[&parties[1]]);
        parties[0].store_object(&obj).await.unwrap();

        let shared = parties[1]
            .store
            .objects_shared_with(&parties[1].user)
            .await
            .unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(
            parties[0].store.public_key_for(&parties[1].user).await.unwrap(),
            Some(parties[1].public_key())
        );
    }

    #[tokio::test]
    async fn test_vault_reads_fixture_upload() {
        let alice = &multi_party_fixtures(1)[0];
        let vault = unlocked_vault(alice.store.clone(), "bob").await.unwrap();

        let keys = BTreeMap::from([(vault.user().clone(), vault.public_key())]);
        let obj = alice
            .service
            .encrypt_for_recipients(&alice.user, &alice.keys.public, b"for bob", "b", 7, &keys)
            .unwrap();
        let doc = alice.store_object(&obj).await.unwrap();

        let read = vault.download(&doc.id).await.unwrap();
        assert_eq!(read.content, b"for bob");
        assert!(matches!(
            vault.unshare(&doc.id, &alice.user).await,
            Err(cryptdrop::VaultError::NotOwner(_))
        ));
    }
}
