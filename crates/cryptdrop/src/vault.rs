//! The Vault: one account's view of the encrypted object store.
//!
//! The Vault ties the layers together. It publishes the account's public
//! key and sealed private key, unlocks through any configured method,
//! encrypts uploads for their recipients, verifies and decrypts downloads,
//! and drives key rotation.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use cryptdrop_core::{hash, CancelToken, EncryptedBlob, KemPrivateKey, KeyPair, ObjectId, UserId};
use cryptdrop_envelope::{ContentEncryptionService, DecryptedObject, EncryptedObject, RecipientKeys};
use cryptdrop_rotation::{
    KeyRotationMigrator, MigrationEvent, MigrationState, MigrationSummary, RotationKeys,
};
use cryptdrop_store::{
    DocumentStore, ObjectDocument, ObjectStore, ProfileStore, ProfileStoreExt, UserProfile,
    WriteBatch,
};
use cryptdrop_unlock::{
    offerable_methods, Authenticator, AuthenticatorSealedKey, Clock, KdfParams, KeyFile,
    KeyUnlockManager, LockReason, PassphraseSealedKey, SealedKeyMaterial, SystemClock,
    UnlockMethod, UnlockOutcome, UnlockState, UnlockStrategy,
};

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};

/// Everything the Vault needs from the backend.
pub trait Backend: ProfileStore + ObjectStore + DocumentStore {}

impl<T: ProfileStore + ObjectStore + DocumentStore + ?Sized> Backend for T {}

/// Decrypted listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub id: ObjectId,
    pub owner: UserId,
    pub name: String,
    pub size: u64,
    pub created_at: i64,
}

/// One account's vault.
pub struct Vault<S: Backend> {
    user: UserId,
    store: Arc<S>,
    config: VaultConfig,
    clock: Arc<dyn Clock>,
    unlock: KeyUnlockManager,
    envelope: ContentEncryptionService,
    migrator: KeyRotationMigrator<S>,
    authenticators: Vec<Arc<dyn Authenticator>>,
}

impl<S: Backend> Vault<S> {
    // ─────────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an account: generate a key pair, seal the private key under
    /// `passphrase` and publish the profile. The returned vault is locked.
    pub async fn create_account(
        store: Arc<S>,
        user: UserId,
        passphrase: &str,
        config: VaultConfig,
    ) -> Result<Self> {
        if store.get_profile(&user).await?.is_some() {
            return Err(VaultError::AccountExists(user));
        }

        let pair = KeyPair::generate();
        let sealed = seal_blocking(pair.private.clone(), passphrase, config.unlock.kdf).await?;
        let material = SealedKeyMaterial::with_passphrase(sealed);

        let mut profile = UserProfile::new(user.clone(), pair.public.to_base64());
        profile.sealed_keys = material.to_tagged();
        store.put_profile(&profile).await?;

        info!(user = %user, fingerprint = %pair.public.fingerprint(), "account created");
        Ok(Self::assemble(store, user, pair.public.clone(), material, config))
    }

    /// Open an existing account. The returned vault is locked.
    pub async fn open(store: Arc<S>, user: UserId, config: VaultConfig) -> Result<Self> {
        let profile = store
            .get_profile(&user)
            .await?
            .ok_or_else(|| VaultError::AccountNotFound(user.clone()))?;
        let public_key = cryptdrop_core::KemPublicKey::from_base64(&profile.public_key)?;
        let material = SealedKeyMaterial::from_tagged(&profile.sealed_keys)?;

        debug!(user = %user, "account opened");
        Ok(Self::assemble(store, user, public_key, material, config))
    }

    fn assemble(
        store: Arc<S>,
        user: UserId,
        public_key: cryptdrop_core::KemPublicKey,
        material: SealedKeyMaterial,
        config: VaultConfig,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            unlock: KeyUnlockManager::new(public_key, material, config.unlock.clone())
                .with_clock(clock.clone()),
            migrator: KeyRotationMigrator::new(store.clone(), config.migration.clone()),
            envelope: ContentEncryptionService::new(),
            authenticators: Vec::new(),
            clock,
            config,
            store,
            user,
        }
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.unlock = self.unlock.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Make an authenticator available on this device.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticators.push(authenticator);
        self
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn public_key(&self) -> cryptdrop_core::KemPublicKey {
        self.unlock.public_key()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    async fn profile(&self) -> Result<UserProfile> {
        self.store
            .get_profile(&self.user)
            .await?
            .ok_or_else(|| VaultError::AccountNotFound(self.user.clone()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Unlock
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn unlock(
        &self,
        strategy: &UnlockStrategy,
        remember_longer: bool,
        cancel: &CancelToken,
    ) -> Result<UnlockOutcome> {
        Ok(self.unlock.unlock(strategy, remember_longer, cancel).await?)
    }

    /// Drop the key and every cached content secret.
    pub fn lock(&self, reason: LockReason) -> bool {
        self.envelope.cache().clear();
        self.unlock.lock(reason)
    }

    pub fn state(&self) -> UnlockState {
        self.unlock.state()
    }

    pub fn on_visibility_change(&self, hidden: bool) -> UnlockState {
        let state = self.unlock.on_visibility_change(hidden);
        if !state.is_unlocked() {
            self.envelope.cache().clear();
        }
        state
    }

    fn private_key(&self) -> Result<KemPrivateKey> {
        match self.unlock.private_key() {
            Ok(key) => Ok(key),
            Err(e) => {
                self.envelope.cache().clear();
                Err(e.into())
            }
        }
    }

    /// Register a platform or roaming authenticator and seal the unlocked
    /// key under it. Returns the method it enables.
    pub async fn enroll_authenticator(
        &self,
        authenticator: &dyn Authenticator,
    ) -> Result<UnlockMethod> {
        let private = self.private_key()?;
        let sealed = AuthenticatorSealedKey::enroll(authenticator, &self.user, &private).await?;
        let method = sealed.method();

        let mut material = self.unlock.material();
        material.set_authenticator_seal(sealed);

        let mut profile = self.profile().await?;
        profile.sealed_keys = material.to_tagged();
        self.store.put_profile(&profile).await?;
        self.unlock.set_material(material);

        info!(user = %self.user, %method, "authenticator enrolled");
        Ok(method)
    }

    /// Methods to offer on the unlock screen.
    pub async fn offerable_methods(&self) -> Vec<UnlockMethod> {
        offerable_methods(&self.unlock.material(), &self.authenticators).await
    }

    /// Export the unlocked key as a key file: encrypted JSON with a
    /// passphrase, plain hex without.
    pub fn export_key_file(&self, passphrase: Option<&str>) -> Result<Zeroizing<String>> {
        let private = self.private_key()?;
        match passphrase {
            Some(passphrase) => Ok(Zeroizing::new(KeyFile::export_encrypted(
                &private,
                passphrase,
                self.config.unlock.kdf,
            )?)),
            None => Ok(KeyFile::export_plain(&private)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Objects
    // ─────────────────────────────────────────────────────────────────────────

    /// Store an object only the owner can read.
    pub async fn upload(&self, content: &[u8], name: &str) -> Result<ObjectId> {
        self.upload_shared(content, name, &[]).await
    }

    /// Store an object readable by the owner and `recipients`.
    pub async fn upload_shared(
        &self,
        content: &[u8],
        name: &str,
        recipients: &[UserId],
    ) -> Result<ObjectId> {
        let mut keys = BTreeMap::new();
        for recipient in recipients.iter().filter(|r| **r != self.user) {
            let public = self
                .store
                .public_key_for(recipient)
                .await?
                .ok_or_else(|| VaultError::RecipientNotFound(recipient.clone()))?;
            keys.insert(recipient.clone(), public);
        }

        let obj = self.envelope.encrypt_for_recipients(
            &self.user,
            &self.unlock.public_key(),
            content,
            name,
            content.len() as u64,
            &keys,
        )?;

        let blob = Bytes::from(
            serde_json::to_vec(&obj.encrypted_content).expect("JSON serialization failed"),
        );
        let doc = ObjectDocument {
            id: obj.id.clone(),
            owner: obj.owner.clone(),
            content_path: content_path(&obj.owner, &obj.id),
            content_digest: hash(&blob).to_hex(),
            encrypted_name: obj.encrypted_name,
            encrypted_size: obj.encrypted_size,
            encrypted_keys: obj.encrypted_keys.encode(),
            created_at: self.clock.now_millis(),
        };

        self.store.put_blob(&doc.content_path, blob).await?;
        self.store.put_object(&doc).await?;

        info!(object = %doc.id, recipients = doc.encrypted_keys.len(), "object uploaded");
        Ok(obj.id)
    }

    async fn document(&self, id: &ObjectId) -> Result<ObjectDocument> {
        self.store
            .get_object(id)
            .await?
            .ok_or_else(|| VaultError::ObjectNotFound(id.clone()))
    }

    async fn owned_document(&self, id: &ObjectId) -> Result<ObjectDocument> {
        let doc = self.document(id).await?;
        if doc.owner != self.user {
            return Err(VaultError::NotOwner(id.clone()));
        }
        Ok(doc)
    }

    /// Fetch, verify and decrypt an object.
    pub async fn download(&self, id: &ObjectId) -> Result<DecryptedObject> {
        let private = self.private_key()?;
        let doc = self.document(id).await?;
        let keys = RecipientKeys::decode(&doc.encrypted_keys)?;
        if !keys.contains(&self.user) {
            return Err(cryptdrop_envelope::EnvelopeError::NotSharedWithUser(self.user.clone()).into());
        }

        let blob = self
            .store
            .get_blob(&doc.content_path)
            .await?
            .ok_or_else(|| VaultError::ObjectNotFound(id.clone()))?;
        if !hash(&blob).matches_hex(&doc.content_digest).unwrap_or(false) {
            warn!(object = %id, "content digest mismatch");
            return Err(VaultError::IntegrityCheckFailed(id.clone()));
        }
        let encrypted_content: EncryptedBlob = serde_json::from_slice(&blob)
            .map_err(|_| VaultError::IntegrityCheckFailed(id.clone()))?;

        let obj = EncryptedObject {
            id: doc.id,
            owner: doc.owner,
            encrypted_content,
            encrypted_name: doc.encrypted_name,
            encrypted_size: doc.encrypted_size,
            encrypted_keys: keys,
        };
        Ok(self.envelope.decrypt_for_user(&obj, &self.user, &private)?)
    }

    /// Names and sizes of every object shared with this account.
    pub async fn list(&self) -> Result<Vec<ObjectSummary>> {
        let private = self.private_key()?;
        let docs = self.store.objects_shared_with(&self.user).await?;

        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            let keys = RecipientKeys::decode(&doc.encrypted_keys)?;
            let (name, size) = self.envelope.decrypt_metadata(
                &doc.id,
                &keys,
                &doc.encrypted_name,
                &doc.encrypted_size,
                &self.user,
                &private,
            )?;
            out.push(ObjectSummary {
                id: doc.id,
                owner: doc.owner,
                name,
                size,
                created_at: doc.created_at,
            });
        }
        Ok(out)
    }

    /// Give `recipient` access. Any current recipient may share.
    pub async fn share(&self, id: &ObjectId, recipient: &UserId) -> Result<()> {
        let private = self.private_key()?;
        let doc = self.document(id).await?;
        let public = self
            .store
            .public_key_for(recipient)
            .await?
            .ok_or_else(|| VaultError::RecipientNotFound(recipient.clone()))?;

        let mut keys = RecipientKeys::decode(&doc.encrypted_keys)?;
        self.envelope
            .grant_access(id, &mut keys, &self.user, &private, recipient, &public)?;
        let wrapped = keys
            .get(recipient)
            .map(|w| w.encode())
            .ok_or_else(|| VaultError::RecipientNotFound(recipient.clone()))?;

        let mut batch = WriteBatch::new();
        batch.set_wrapped_key(id.clone(), recipient.clone(), wrapped);
        self.store.commit_batch(batch).await?;

        info!(object = %id, recipient = %recipient, "object shared");
        Ok(())
    }

    /// Remove `user`'s access. Owner only. Returns whether `user` had
    /// access.
    ///
    /// The content secret is not rotated: a removed recipient who kept the
    /// secret or a decrypted copy can still read the existing blobs.
    pub async fn unshare(&self, id: &ObjectId, user: &UserId) -> Result<bool> {
        let doc = self.owned_document(id).await?;
        let mut keys = RecipientKeys::decode(&doc.encrypted_keys)?;
        if !self.envelope.revoke_access(id, &mut keys, &doc.owner, user)? {
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        batch.remove_wrapped_key(id.clone(), user.clone());
        self.store.commit_batch(batch).await?;

        info!(object = %id, user = %user, "object unshared");
        Ok(true)
    }

    /// Current recipients, owner included.
    pub async fn recipients(&self, id: &ObjectId) -> Result<Vec<UserId>> {
        Ok(self.document(id).await?.encrypted_keys.into_keys().collect())
    }

    /// Delete an object and its blob. Owner only.
    pub async fn delete(&self, id: &ObjectId) -> Result<()> {
        let doc = self.owned_document(id).await?;
        self.store.delete_blob(&doc.content_path).await?;
        self.store.delete_object(id).await?;
        self.envelope.cache().evict_object(id);

        info!(object = %id, "object deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key rotation
    // ─────────────────────────────────────────────────────────────────────────

    /// Receive migration progress events.
    pub fn subscribe_migration(&self) -> broadcast::Receiver<MigrationEvent> {
        self.migrator.subscribe()
    }

    pub fn migration_state(&self) -> MigrationState {
        self.migrator.state()
    }

    /// Replace the account key pair and migrate every shared object.
    ///
    /// The old key is kept passphrase-sealed in the profile until a run
    /// finishes with no failures. Authenticator seals are dropped and must
    /// be enrolled again.
    pub async fn rotate_key_pair(
        &self,
        passphrase: &str,
        cancel: &CancelToken,
    ) -> Result<MigrationSummary> {
        let old = self.private_key()?;
        let material = self.unlock.material();
        if let Some(current) = &material.passphrase {
            current
                .open_blocking(Zeroizing::new(passphrase.to_string()))
                .await?;
        }

        let mut profile = self.profile().await?;
        let mut old_keys = vec![old.clone()];
        old_keys.extend(open_retired(&profile, passphrase).await?);

        let kdf = self.config.unlock.kdf;
        let pair = KeyPair::generate();
        let retired = seal_blocking(old, passphrase, kdf).await?.to_json();
        let new_material = SealedKeyMaterial::with_passphrase(
            seal_blocking(pair.private.clone(), passphrase, kdf).await?,
        );

        profile.retired_keys.insert(0, retired);
        profile.public_key = pair.public.to_base64();
        profile.sealed_keys = new_material.to_tagged();

        // The in-memory switch fails if the session expired; nothing is
        // persisted in that case. A failed write switches back.
        self.unlock.replace_key(pair.private.clone(), new_material)?;
        if let Err(e) = self.store.put_profile(&profile).await {
            warn!(user = %self.user, error = %e, "profile write failed, keeping current key");
            if let Err(rollback) = self.unlock.replace_key(old_keys[0].clone(), material) {
                warn!(user = %self.user, error = %rollback, "could not restore previous key");
            }
            return Err(e.into());
        }
        self.envelope.cache().clear();

        info!(
            user = %self.user,
            fingerprint = %pair.public.fingerprint(),
            "key pair rotated"
        );

        self.migrate(RotationKeys::new(old_keys, pair.private), cancel)
            .await
    }

    /// Re-run migration with every retired key. Safe to repeat.
    pub async fn resume_key_rotation(
        &self,
        passphrase: &str,
        cancel: &CancelToken,
    ) -> Result<MigrationSummary> {
        let current = self.private_key()?;
        let profile = self.profile().await?;
        let old = open_retired(&profile, passphrase).await?;

        debug!(user = %self.user, retired = old.len(), "resuming key rotation");
        self.migrate(RotationKeys::new(old, current), cancel).await
    }

    async fn migrate(&self, keys: RotationKeys, cancel: &CancelToken) -> Result<MigrationSummary> {
        let summary = self.migrator.run(&self.user, &keys, cancel).await?;

        if summary.is_clean() {
            let mut profile = self.profile().await?;
            if !profile.retired_keys.is_empty() {
                profile.retired_keys.clear();
                self.store.put_profile(&profile).await?;
                info!(user = %self.user, "retired keys removed");
            }
        }
        Ok(summary.into_result()?)
    }
}

impl<S: Backend> std::fmt::Debug for Vault<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("user", &self.user)
            .field("state", &self.unlock.state())
            .finish_non_exhaustive()
    }
}

fn content_path(owner: &UserId, id: &ObjectId) -> String {
    format!("objects/{owner}/{id}")
}

/// Passphrase-seal on the blocking pool.
async fn seal_blocking(
    private: KemPrivateKey,
    passphrase: &str,
    kdf: KdfParams,
) -> Result<PassphraseSealedKey> {
    let passphrase = Zeroizing::new(passphrase.to_string());
    let sealed =
        tokio::task::spawn_blocking(move || PassphraseSealedKey::seal(&private, &passphrase, kdf))
            .await
            .map_err(|e| VaultError::Task(e.to_string()))??;
    Ok(sealed)
}

/// Open every retired key in a profile, newest first.
async fn open_retired(profile: &UserProfile, passphrase: &str) -> Result<Vec<KemPrivateKey>> {
    let mut keys = Vec::with_capacity(profile.retired_keys.len());
    for json in &profile.retired_keys {
        let sealed = PassphraseSealedKey::from_json(json)?;
        keys.push(
            sealed
                .open_blocking(Zeroizing::new(passphrase.to_string()))
                .await?,
        );
    }
    Ok(keys)
}
