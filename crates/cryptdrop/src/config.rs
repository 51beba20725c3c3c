//! Vault configuration.

use serde::{Deserialize, Serialize};

use cryptdrop_rotation::MigrationConfig;
use cryptdrop_unlock::{KdfParams, UnlockConfig};

/// Configuration for the Vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultConfig {
    /// Session lifetimes and passphrase cost.
    pub unlock: UnlockConfig,
    /// Key rotation batching.
    pub migration: MigrationConfig,
}

impl VaultConfig {
    pub fn with_unlock(mut self, unlock: UnlockConfig) -> Self {
        self.unlock = unlock;
        self
    }

    pub fn with_migration(mut self, migration: MigrationConfig) -> Self {
        self.migration = migration;
        self
    }

    /// Shorthand for the passphrase KDF cost.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.unlock.kdf = kdf;
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
