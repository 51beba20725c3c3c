//! Unlock methods and the manager's observable state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four ways to obtain the private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnlockMethod {
    Passphrase,
    Biometric,
    HardwareKey,
    KeyFile,
}

impl UnlockMethod {
    pub const ALL: [UnlockMethod; 4] = [
        UnlockMethod::Passphrase,
        UnlockMethod::Biometric,
        UnlockMethod::HardwareKey,
        UnlockMethod::KeyFile,
    ];

    /// Stable tag used as a key in stored profiles.
    pub fn tag(&self) -> &'static str {
        match self {
            UnlockMethod::Passphrase => "passphrase",
            UnlockMethod::Biometric => "biometric",
            UnlockMethod::HardwareKey => "hardwareKey",
            UnlockMethod::KeyFile => "keyFile",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.tag() == tag)
    }
}

impl fmt::Display for UnlockMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnlockMethod::Passphrase => "passphrase",
            UnlockMethod::Biometric => "biometric",
            UnlockMethod::HardwareKey => "hardware key",
            UnlockMethod::KeyFile => "key file",
        })
    }
}

/// Observable state of the unlock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockState {
    Locked,
    /// A strategy is running, possibly waiting on a prompt.
    Unlocking(UnlockMethod),
    Unlocked {
        method: UnlockMethod,
        /// Expiry (Unix ms).
        until_millis: i64,
    },
}

impl UnlockState {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, UnlockState::Unlocked { .. })
    }
}

/// Why the key was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    Manual,
    Logout,
    Expired,
    HiddenTooLong,
}
