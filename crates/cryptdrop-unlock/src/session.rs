//! The unlocked-key session.
//!
//! Exactly one component owns the unlocked private key: the session held by
//! the unlock manager. Teardown zeroizes the key.

use zeroize::Zeroize;

use cryptdrop_core::KemPrivateKey;

use crate::state::UnlockMethod;

/// An unlocked private key and its lifetime.
pub struct UnlockSession {
    key: KemPrivateKey,
    method: UnlockMethod,
    remember_longer: bool,
    expires_at_millis: i64,
    hidden_since_millis: Option<i64>,
}

impl UnlockSession {
    pub fn new(
        key: KemPrivateKey,
        method: UnlockMethod,
        remember_longer: bool,
        expires_at_millis: i64,
    ) -> Self {
        Self {
            key,
            method,
            remember_longer,
            expires_at_millis,
            hidden_since_millis: None,
        }
    }

    pub fn key(&self) -> &KemPrivateKey {
        &self.key
    }

    pub fn method(&self) -> UnlockMethod {
        self.method
    }

    pub fn remember_longer(&self) -> bool {
        self.remember_longer
    }

    pub fn expires_at_millis(&self) -> i64 {
        self.expires_at_millis
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at_millis
    }

    /// Record that the app went to the background.
    pub fn mark_hidden(&mut self, now_millis: i64) {
        self.hidden_since_millis.get_or_insert(now_millis);
    }

    /// Record that the app came back. Returns how long it was hidden.
    pub fn mark_visible(&mut self, now_millis: i64) -> Option<i64> {
        self.hidden_since_millis
            .take()
            .map(|since| now_millis.saturating_sub(since))
    }

    /// Swap in a new key, keeping method and expiry. The old key is
    /// zeroized.
    pub fn replace_key(&mut self, key: KemPrivateKey) {
        let mut old = std::mem::replace(&mut self.key, key);
        old.zeroize();
    }

    /// Zeroize and drop the key.
    pub fn teardown(mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for UnlockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockSession")
            .field("method", &self.method)
            .field("expires_at_millis", &self.expires_at_millis)
            .field("hidden_since_millis", &self.hidden_since_millis)
            .finish_non_exhaustive()
    }
}
