//! The key unlock manager.
//!
//! Owns the account's unlock state:
//! `Locked -> Unlocking(method) -> Unlocked { until } -> Locked`.
//! Other components borrow the key through [`KeyUnlockManager::private_key`]
//! and never hold it past a lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use cryptdrop_core::{CancelToken, KemPrivateKey, KemPublicKey};

use crate::clock::{duration_millis, Clock, SystemClock};
use crate::config::UnlockConfig;
use crate::error::{Result, UnlockError};
use crate::sealed::SealedKeyMaterial;
use crate::session::UnlockSession;
use crate::state::{LockReason, UnlockMethod, UnlockState};
use crate::strategy::UnlockStrategy;

/// What a successful unlock hands back to the caller.
pub struct UnlockOutcome {
    pub private_key_hex: Zeroizing<String>,
    pub remember_longer: bool,
    pub method: UnlockMethod,
    pub expires_at_millis: i64,
}

impl std::fmt::Debug for UnlockOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockOutcome")
            .field("private_key_hex", &"[REDACTED]")
            .field("remember_longer", &self.remember_longer)
            .field("method", &self.method)
            .field("expires_at_millis", &self.expires_at_millis)
            .finish()
    }
}

struct Inner {
    public_key: KemPublicKey,
    material: SealedKeyMaterial,
    unlocking: Option<UnlockMethod>,
    session: Option<UnlockSession>,
}

impl Inner {
    /// Drop an expired session. Returns whether one was dropped.
    fn expire(&mut self, now_millis: i64) -> bool {
        let expired = self
            .session
            .as_ref()
            .is_some_and(|session| session.is_expired(now_millis));
        if expired {
            self.end_session(LockReason::Expired);
        }
        expired
    }

    fn end_session(&mut self, reason: LockReason) -> bool {
        match self.session.take() {
            Some(session) => {
                let method = session.method();
                session.teardown();
                info!(?reason, %method, "private key locked");
                true
            }
            None => false,
        }
    }

    fn state(&self) -> UnlockState {
        if let Some(method) = self.unlocking {
            return UnlockState::Unlocking(method);
        }
        match &self.session {
            Some(session) => UnlockState::Unlocked {
                method: session.method(),
                until_millis: session.expires_at_millis(),
            },
            None => UnlockState::Locked,
        }
    }
}

/// Unlock state machine and custodian of the unlocked private key.
pub struct KeyUnlockManager {
    config: UnlockConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl KeyUnlockManager {
    /// Create a locked manager for an account.
    pub fn new(public_key: KemPublicKey, material: SealedKeyMaterial, config: UnlockConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            inner: Mutex::new(Inner {
                public_key,
                material,
                unlocking: None,
                session: None,
            }),
        }
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &UnlockConfig {
        &self.config
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a strategy and, on success, hold the key until expiry.
    ///
    /// Any held key is dropped first. On failure the state returns to
    /// `Locked`. A key that does not belong to the account's public key is
    /// an `Authentication` failure.
    pub async fn unlock(
        &self,
        strategy: &UnlockStrategy,
        remember_longer: bool,
        cancel: &CancelToken,
    ) -> Result<UnlockOutcome> {
        let method = strategy.method();
        let (public_key, material) = {
            let mut inner = self.inner();
            inner.end_session(LockReason::Manual);
            inner.unlocking = Some(method);
            (inner.public_key.clone(), inner.material.clone())
        };
        let mut attempt = UnlockAttempt {
            manager: self,
            method,
            settled: false,
        };
        debug!(%method, "unlocking");

        let result = strategy
            .obtain_private_key(&material, cancel)
            .await
            .and_then(|key| {
                if key.matches(&public_key) {
                    Ok(key)
                } else {
                    Err(UnlockError::Authentication)
                }
            });

        let mut inner = self.inner();
        attempt.settled = true;
        inner.unlocking = None;
        match result {
            Ok(key) => {
                let now = self.clock.now_millis();
                let ttl = duration_millis(self.config.ttl(remember_longer));
                let expires_at_millis = now.saturating_add(ttl);
                let private_key_hex = key.to_hex();
                inner.session = Some(UnlockSession::new(
                    key,
                    method,
                    remember_longer,
                    expires_at_millis,
                ));
                info!(%method, remember_longer, expires_at_millis, "private key unlocked");
                Ok(UnlockOutcome {
                    private_key_hex,
                    remember_longer,
                    method,
                    expires_at_millis,
                })
            }
            Err(e) => {
                warn!(%method, error = %e, "unlock failed");
                Err(e)
            }
        }
    }

    /// Drop the key. Returns whether one was held.
    pub fn lock(&self, reason: LockReason) -> bool {
        self.inner().end_session(reason)
    }

    /// Report the app going to (`hidden = true`) or returning from the
    /// background. Returning after more than the grace period locks.
    pub fn on_visibility_change(&self, hidden: bool) -> UnlockState {
        let now = self.clock.now_millis();
        let grace = duration_millis(self.config.hidden_grace);
        let mut inner = self.inner();
        inner.expire(now);

        let hidden_too_long = match inner.session.as_mut() {
            Some(session) if hidden => {
                session.mark_hidden(now);
                false
            }
            Some(session) => session.mark_visible(now).is_some_and(|away| away > grace),
            None => false,
        };
        if hidden_too_long {
            inner.end_session(LockReason::HiddenTooLong);
        }
        inner.state()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access
    // ─────────────────────────────────────────────────────────────────────────

    /// Current state. Expiry is applied first.
    pub fn state(&self) -> UnlockState {
        let now = self.clock.now_millis();
        let mut inner = self.inner();
        inner.expire(now);
        inner.state()
    }

    pub fn is_unlocked(&self) -> bool {
        self.state().is_unlocked()
    }

    /// A copy of the unlocked key, or `Locked`.
    pub fn private_key(&self) -> Result<KemPrivateKey> {
        self.with_private_key(KemPrivateKey::clone)
    }

    /// Borrow the unlocked key without copying it out.
    pub fn with_private_key<R>(&self, f: impl FnOnce(&KemPrivateKey) -> R) -> Result<R> {
        let now = self.clock.now_millis();
        let mut inner = self.inner();
        inner.expire(now);
        inner
            .session
            .as_ref()
            .map(|session| f(session.key()))
            .ok_or(UnlockError::Locked)
    }

    pub fn public_key(&self) -> KemPublicKey {
        self.inner().public_key.clone()
    }

    pub fn material(&self) -> SealedKeyMaterial {
        self.inner().material.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Account changes
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the stored sealed material, e.g. after enrolling a method.
    pub fn set_material(&self, material: SealedKeyMaterial) {
        self.inner().material = material;
    }

    /// Switch the account to a new key pair while unlocked.
    ///
    /// The session keeps its method and expiry; the old key is zeroized.
    pub fn replace_key(&self, private: KemPrivateKey, material: SealedKeyMaterial) -> Result<()> {
        let now = self.clock.now_millis();
        let mut inner = self.inner();
        inner.expire(now);
        let public_key = private.public_key();
        let session = inner.session.as_mut().ok_or(UnlockError::Locked)?;
        session.replace_key(private);
        inner.public_key = public_key;
        inner.material = material;
        info!("account key replaced");
        Ok(())
    }
}

/// Returns the manager to `Locked` if an unlock future is dropped while
/// the strategy is still pending.
struct UnlockAttempt<'a> {
    manager: &'a KeyUnlockManager,
    method: UnlockMethod,
    settled: bool,
}

impl Drop for UnlockAttempt<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut inner = self.manager.inner();
        if inner.unlocking == Some(self.method) {
            inner.unlocking = None;
            warn!(method = %self.method, "unlock abandoned");
        }
    }
}

impl std::fmt::Debug for KeyUnlockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyUnlockManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::{PromptBehavior, SoftwareAuthenticator};
    use crate::clock::ManualClock;
    use crate::kdf::KdfParams;
    use crate::sealed::{AuthenticatorSealedKey, PassphraseSealedKey};
    use cryptdrop_core::{KeyPair, UserId};
    use std::time::Duration;

    fn manager(pair: &KeyPair) -> (KeyUnlockManager, Arc<ManualClock>) {
        let material = SealedKeyMaterial::with_passphrase(
            PassphraseSealedKey::seal(&pair.private, "pw", KdfParams::minimal()).unwrap(),
        );
        let clock = Arc::new(ManualClock::new(1_000));
        let manager = KeyUnlockManager::new(pair.public.clone(), material, UnlockConfig::default())
            .with_clock(clock.clone());
        (manager, clock)
    }

    #[tokio::test]
    async fn test_unlock_sets_expiry() {
        let pair = KeyPair::generate();
        let (manager, _clock) = manager(&pair);

        let outcome = manager
            .unlock(&UnlockStrategy::passphrase("pw"), false, &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(outcome.method, UnlockMethod::Passphrase);
        assert_eq!(outcome.expires_at_millis, 1_000 + 15 * 60 * 1_000);
        assert_eq!(outcome.private_key_hex.as_str(), pair.private.to_hex().as_str());
        assert_eq!(
            manager.state(),
            UnlockState::Unlocked {
                method: UnlockMethod::Passphrase,
                until_millis: outcome.expires_at_millis
            }
        );
    }

    #[tokio::test]
    async fn test_remember_longer() {
        let pair = KeyPair::generate();
        let (manager, _clock) = manager(&pair);
        let outcome = manager
            .unlock(&UnlockStrategy::passphrase("pw"), true, &CancelToken::never())
            .await
            .unwrap();
        assert!(outcome.remember_longer);
        assert_eq!(outcome.expires_at_millis, 1_000 + 60 * 60 * 1_000);
    }

    #[tokio::test]
    async fn test_expiry_locks() {
        let pair = KeyPair::generate();
        let (manager, clock) = manager(&pair);
        manager
            .unlock(&UnlockStrategy::passphrase("pw"), false, &CancelToken::never())
            .await
            .unwrap();

        clock.advance(Duration::from_secs(15 * 60));
        assert!(matches!(manager.private_key(), Err(UnlockError::Locked)));
        assert_eq!(manager.state(), UnlockState::Locked);
    }

    #[tokio::test]
    async fn test_hidden_grace() {
        let pair = KeyPair::generate();
        let (manager, clock) = manager(&pair);
        manager
            .unlock(&UnlockStrategy::passphrase("pw"), false, &CancelToken::never())
            .await
            .unwrap();

        manager.on_visibility_change(true);
        clock.advance(Duration::from_secs(60));
        assert!(manager.on_visibility_change(false).is_unlocked());

        manager.on_visibility_change(true);
        clock.advance(Duration::from_secs(5 * 60 + 1));
        assert_eq!(manager.on_visibility_change(false), UnlockState::Locked);
    }

    #[tokio::test]
    async fn test_foreign_key_rejected() {
        let pair = KeyPair::generate();
        let (manager, _clock) = manager(&pair);
        let foreign = KeyPair::generate();
        let file = crate::keyfile::KeyFile::Plain(foreign.private.clone());

        let result = manager
            .unlock(&UnlockStrategy::key_file(file, None), false, &CancelToken::never())
            .await;
        assert!(matches!(result, Err(UnlockError::Authentication)));
        assert_eq!(manager.state(), UnlockState::Locked);
    }

    #[tokio::test]
    async fn test_manual_lock() {
        let pair = KeyPair::generate();
        let (manager, _clock) = manager(&pair);
        manager
            .unlock(&UnlockStrategy::passphrase("pw"), false, &CancelToken::never())
            .await
            .unwrap();

        assert!(manager.lock(LockReason::Logout));
        assert!(!manager.lock(LockReason::Manual));
        assert!(matches!(manager.private_key(), Err(UnlockError::Locked)));
    }

    #[tokio::test]
    async fn test_replace_key_requires_session() {
        let pair = KeyPair::generate();
        let (manager, _clock) = manager(&pair);
        let next = KeyPair::generate();
        assert!(matches!(
            manager.replace_key(next.private.clone(), SealedKeyMaterial::new()),
            Err(UnlockError::Locked)
        ));

        manager
            .unlock(&UnlockStrategy::passphrase("pw"), false, &CancelToken::never())
            .await
            .unwrap();
        manager
            .replace_key(next.private.clone(), SealedKeyMaterial::new())
            .unwrap();
        assert_eq!(manager.public_key(), next.public);
        assert!(manager.private_key().unwrap().matches(&next.public));
    }

    #[tokio::test]
    async fn test_abandoned_unlock_returns_to_locked() {
        let pair = KeyPair::generate();
        let (manager, _clock) = manager(&pair);
        let auth = Arc::new(SoftwareAuthenticator::platform());
        let mut material = manager.material();
        material.set_authenticator_seal(
            AuthenticatorSealedKey::enroll(auth.as_ref(), &UserId::new("a"), &pair.private)
                .await
                .unwrap(),
        );
        manager.set_material(material);
        auth.set_behavior(PromptBehavior::Hang);

        let strategy = UnlockStrategy::biometric(auth.clone());
        let pending = tokio::time::timeout(
            Duration::from_millis(50),
            manager.unlock(&strategy, false, &CancelToken::never()),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(manager.state(), UnlockState::Locked);

        auth.set_behavior(PromptBehavior::Approve);
        let outcome = manager
            .unlock(&strategy, false, &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(outcome.method, UnlockMethod::Biometric);
        assert!(manager.is_unlocked());
    }

    #[tokio::test]
    async fn test_oversized_ttl_saturates() {
        let pair = KeyPair::generate();
        let material = SealedKeyMaterial::with_passphrase(
            PassphraseSealedKey::seal(&pair.private, "pw", KdfParams::minimal()).unwrap(),
        );
        let config = UnlockConfig::default().with_default_ttl(Duration::MAX);
        let manager = KeyUnlockManager::new(pair.public.clone(), material, config)
            .with_clock(Arc::new(ManualClock::new(1_000)));

        let outcome = manager
            .unlock(&UnlockStrategy::passphrase("pw"), false, &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(outcome.expires_at_millis, i64::MAX);
        assert!(manager.is_unlocked());
    }
}
