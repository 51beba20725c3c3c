//! The key rotation migrator.
//!
//! After a key-pair change, every object shared with the user carries a
//! wrapped key for the old public key. The migrator re-wraps each entry
//! for the new public key and leaves the content, name and size blobs
//! untouched.
//!
//! # Properties
//!
//! - **Batched**: entries are committed in batches no larger than the
//!   store's limit.
//! - **Resumable**: an entry the new key already opens is counted as
//!   already migrated and not rewritten, so a second run is a no-op.
//! - **Non-fatal failures**: an object that cannot be migrated is recorded
//!   and skipped.
//! - **Cancellable**: cancellation is checked between batches. Committed
//!   batches stay migrated and the rest still open with the old key.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use cryptdrop_core::{CancelToken, KemPrivateKey, KemPublicKey, ObjectId, UserId};
use cryptdrop_envelope::{ContentEncryptionService, EnvelopeError, RecipientKeys, Rewrap};
use cryptdrop_store::{DocumentStore, ObjectDocument, WriteBatch};

use crate::error::{Result, RotationError};
use crate::events::{MigrationEvent, EVENT_CAPACITY};
use crate::state::{MigrationState, MigrationSummary};

/// Migration tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MigrationConfig {
    /// Objects per committed batch. Capped by the store's limit.
    pub batch_size: Option<usize>,
}

impl MigrationConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// Keys involved in one rotation.
pub struct RotationKeys {
    /// Keys that may still wrap entries, newest first.
    pub old: Vec<KemPrivateKey>,
    pub new_private: KemPrivateKey,
    pub new_public: KemPublicKey,
}

impl RotationKeys {
    pub fn new(old: Vec<KemPrivateKey>, new_private: KemPrivateKey) -> Self {
        let new_public = new_private.public_key();
        Self {
            old,
            new_private,
            new_public,
        }
    }
}

/// Re-wraps a user's entries after a key-pair change.
pub struct KeyRotationMigrator<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    service: ContentEncryptionService,
    config: MigrationConfig,
    state: Mutex<MigrationState>,
    events: broadcast::Sender<MigrationEvent>,
}

impl<S: DocumentStore + ?Sized> KeyRotationMigrator<S> {
    pub fn new(store: Arc<S>, config: MigrationConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            service: ContentEncryptionService::new(),
            config,
            state: Mutex::new(MigrationState::Idle),
            events,
        }
    }

    /// Receive events for subsequent runs.
    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> MigrationState {
        self.lock_state().clone()
    }

    /// Effective batch size for this store.
    pub fn batch_size(&self) -> usize {
        let max = self.store.max_batch_size();
        self.config.batch_size.map_or(max, |n| n.min(max)).max(1)
    }

    fn lock_state(&self) -> MutexGuard<'_, MigrationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: MigrationState) {
        *self.lock_state() = state;
    }

    fn emit(&self, event: MigrationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Migrate every object shared with `user` to `keys.new_public`.
    ///
    /// Returns the summary, even when some objects failed; use
    /// [`MigrationSummary::into_result`] to treat failures as an error.
    /// Fails with `Cancelled` if `cancel` fires between batches. Dropping
    /// the future mid-run also ends in `Cancelled`.
    pub async fn run(
        &self,
        user: &UserId,
        keys: &RotationKeys,
        cancel: &CancelToken,
    ) -> Result<MigrationSummary> {
        let mut run = ActiveRun::start(self)?;

        let docs = match self.store.objects_shared_with(user).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(user = %user, error = %e, "migration scan failed");
                run.finish(MigrationState::Failed(e.to_string()));
                self.emit(MigrationEvent::Failed {
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let total = docs.len();
        let batch_size = self.batch_size();
        run.summary = MigrationSummary::new(total);
        let mut current = 0;

        info!(user = %user, total, batch_size, "migration started");
        self.set_state(MigrationState::Migrating { current, total });
        self.emit(MigrationEvent::Started { total });

        for chunk in docs.chunks(batch_size) {
            if cancel.is_cancelled() {
                let summary = run.summary.clone();
                info!(user = %user, processed = summary.processed(), total, "migration cancelled");
                run.finish(MigrationState::Cancelled(summary.clone()));
                self.emit(MigrationEvent::Cancelled(summary.clone()));
                return Err(RotationError::Cancelled(summary));
            }

            self.migrate_batch(user, keys, chunk, &mut run.summary).await;

            current += chunk.len();
            self.set_state(MigrationState::Migrating { current, total });
            self.emit(MigrationEvent::Progress { current, total });
            tokio::task::yield_now().await;
        }

        let summary = run.summary.clone();
        info!(
            user = %user,
            migrated = summary.migrated,
            already_migrated = summary.already_migrated,
            failed = summary.failures.len(),
            "migration completed"
        );
        run.finish(MigrationState::Completed(summary.clone()));
        self.emit(MigrationEvent::Completed(summary.clone()));
        Ok(summary)
    }

    /// Re-wrap one chunk and commit it as one batch.
    async fn migrate_batch(
        &self,
        user: &UserId,
        keys: &RotationKeys,
        chunk: &[ObjectDocument],
        summary: &mut MigrationSummary,
    ) {
        let mut batch = WriteBatch::new();
        let mut pending: Vec<ObjectId> = Vec::new();

        for doc in chunk {
            match self.rewrap_document(user, keys, doc) {
                Ok(Rewrap::AlreadyCurrent) => summary.already_migrated += 1,
                Ok(Rewrap::Rewrapped(wrapped)) => {
                    batch.set_wrapped_key(doc.id.clone(), user.clone(), wrapped.encode());
                    pending.push(doc.id.clone());
                }
                Err(e) => self.record_failure(summary, doc.id.clone(), e.to_string()),
            }
        }

        if batch.is_empty() {
            return;
        }

        match self.store.commit_batch(batch).await {
            Ok(()) => {
                debug!(user = %user, objects = pending.len(), "migration batch committed");
                summary.migrated += pending.len();
            }
            Err(e) => {
                warn!(user = %user, objects = pending.len(), error = %e, "migration batch failed");
                let reason = format!("batch commit failed: {e}");
                for id in pending {
                    self.record_failure(summary, id, reason.clone());
                }
            }
        }
    }

    fn rewrap_document(
        &self,
        user: &UserId,
        keys: &RotationKeys,
        doc: &ObjectDocument,
    ) -> std::result::Result<Rewrap, EnvelopeError> {
        let entries = RecipientKeys::decode(&doc.encrypted_keys)?;
        let wrapped = entries
            .get(user)
            .ok_or_else(|| EnvelopeError::NotSharedWithUser(user.clone()))?;

        // The new key is checked first on every attempt, so an entry that is
        // already migrated never reaches the old keys.
        for old in &keys.old {
            match self
                .service
                .rewrap_entry(wrapped, old, &keys.new_private, &keys.new_public)
            {
                Err(EnvelopeError::KeyMismatch) => continue,
                other => return other,
            }
        }
        self.service
            .rewrap_entry(wrapped, &keys.new_private, &keys.new_private, &keys.new_public)
    }

    fn record_failure(&self, summary: &mut MigrationSummary, id: ObjectId, reason: String) {
        warn!(object = %id, reason = %reason, "object migration failed");
        let failure = summary.fail(id, reason);
        self.emit(MigrationEvent::ItemFailed {
            object_id: failure.object_id,
            reason: failure.reason,
        });
    }
}

/// Marks a run as in progress. A run dropped before [`ActiveRun::finish`]
/// is recorded as cancelled so the next run can start.
struct ActiveRun<'a, S: DocumentStore + ?Sized> {
    migrator: &'a KeyRotationMigrator<S>,
    summary: MigrationSummary,
    finished: bool,
}

impl<'a, S: DocumentStore + ?Sized> ActiveRun<'a, S> {
    fn start(migrator: &'a KeyRotationMigrator<S>) -> Result<Self> {
        let mut state = migrator.lock_state();
        if state.is_running() {
            return Err(RotationError::AlreadyRunning);
        }
        *state = MigrationState::Scanning;
        drop(state);

        Ok(Self {
            migrator,
            summary: MigrationSummary::default(),
            finished: false,
        })
    }

    fn finish(&mut self, state: MigrationState) {
        self.finished = true;
        self.migrator.set_state(state);
    }
}

impl<S: DocumentStore + ?Sized> Drop for ActiveRun<'_, S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(processed = self.summary.processed(), "migration abandoned mid-run");
        self.migrator
            .set_state(MigrationState::Cancelled(self.summary.clone()));
        self.migrator
            .emit(MigrationEvent::Cancelled(self.summary.clone()));
    }
}

impl<S: DocumentStore + ?Sized> std::fmt::Debug for KeyRotationMigrator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotationMigrator")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
