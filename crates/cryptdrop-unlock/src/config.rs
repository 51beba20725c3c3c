//! Unlock configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::kdf::KdfParams;

/// Session lifetimes and passphrase cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnlockConfig {
    /// Lifetime of an unlocked key.
    #[serde(with = "duration_secs")]
    pub default_ttl: Duration,

    /// Lifetime when the user asked to stay unlocked longer.
    #[serde(with = "duration_secs")]
    pub extended_ttl: Duration,

    /// How long the app may stay hidden before the key is dropped.
    #[serde(with = "duration_secs")]
    pub hidden_grace: Duration,

    /// Argon2id parameters for new passphrase seals.
    pub kdf: KdfParams,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(15 * 60),
            extended_ttl: Duration::from_secs(60 * 60),
            hidden_grace: Duration::from_secs(5 * 60),
            kdf: KdfParams::default(),
        }
    }
}

impl UnlockConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_extended_ttl(mut self, ttl: Duration) -> Self {
        self.extended_ttl = ttl;
        self
    }

    pub fn with_hidden_grace(mut self, grace: Duration) -> Self {
        self.hidden_grace = grace;
        self
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// The lifetime to grant for an unlock.
    pub fn ttl(&self, remember_longer: bool) -> Duration {
        if remember_longer {
            self.extended_ttl
        } else {
            self.default_ttl
        }
    }
}

/// Serde adapter: `Duration` as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = UnlockConfig::default();
        assert_eq!(c.ttl(false), Duration::from_secs(900));
        assert_eq!(c.ttl(true), Duration::from_secs(3600));
        assert_eq!(c.hidden_grace, Duration::from_secs(300));
    }

    #[test]
    fn test_json_partial_override() {
        let c: UnlockConfig = serde_json::from_str(r#"{"defaultTtl": 60}"#).unwrap();
        assert_eq!(c.default_ttl, Duration::from_secs(60));
        assert_eq!(c.extended_ttl, Duration::from_secs(3600));
    }
}
