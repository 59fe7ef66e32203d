//! Node configuration
//!
//! Defaults follow the paper's constants (k = 20, alpha = 3) and the
//! reference timings (5 s RPC window, hourly refresh and republish, one
//! week TTL). Values load from TOML and are validated once at startup;
//! bad values are fatal there, never discovered mid-run.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KadError;

fn default_ksize() -> usize {
    20
}

fn default_alpha() -> usize {
    3
}

fn default_rpc_timeout_secs() -> u64 {
    5
}

fn default_refresh_interval_secs() -> u64 {
    3600
}

fn default_republish_age_secs() -> u64 {
    3600
}

fn default_ttl_secs() -> u64 {
    604_800
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KadConfig {
    /// Bucket size and replication factor.
    #[serde(default = "default_ksize")]
    pub ksize: usize,

    /// Lookup concurrency.
    #[serde(default = "default_alpha")]
    pub alpha: usize,

    /// Per-RPC reply window in seconds.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// How often the background task walks lonely buckets.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Entries at least this old are re-stored by the refresh task.
    #[serde(default = "default_republish_age_secs")]
    pub republish_age_secs: u64,

    /// Lifetime for the TTL storage backend.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Fail `bootstrap` when no seed answers instead of starting alone.
    #[serde(default)]
    pub strict_bootstrap: bool,

    /// Run the signed-value gate on incoming STORE requests.
    #[serde(default)]
    pub enforce_auth: bool,
}

impl Default for KadConfig {
    fn default() -> Self {
        Self {
            ksize: default_ksize(),
            alpha: default_alpha(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            republish_age_secs: default_republish_age_secs(),
            ttl_secs: default_ttl_secs(),
            strict_bootstrap: false,
            enforce_auth: false,
        }
    }
}

impl KadConfig {
    /// Load and validate a TOML configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, KadError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| KadError::Config(format!("unreadable config file: {e}")))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| KadError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KadError> {
        if self.ksize == 0 {
            return Err(KadError::OutOfRange { reason: "ksize must be positive".into() });
        }
        if self.alpha == 0 {
            return Err(KadError::OutOfRange { reason: "alpha must be positive".into() });
        }
        if self.alpha > self.ksize {
            return Err(KadError::OutOfRange {
                reason: format!("alpha ({}) cannot exceed ksize ({})", self.alpha, self.ksize),
            });
        }
        if self.rpc_timeout_secs == 0 {
            return Err(KadError::OutOfRange {
                reason: "rpc_timeout_secs must be positive".into(),
            });
        }
        if self.refresh_interval_secs == 0 {
            return Err(KadError::OutOfRange {
                reason: "refresh_interval_secs must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_paper_constants() {
        let config = KadConfig::default();
        assert_eq!(config.ksize, 20);
        assert_eq!(config.alpha, 3);
        assert_eq!(config.rpc_timeout_secs, 5);
        assert_eq!(config.ttl_secs, 604_800);
        assert!(!config.strict_bootstrap);
        assert!(!config.enforce_auth);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ksize_rejected() {
        let config = KadConfig { ksize: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(KadError::OutOfRange { .. })));
    }

    #[test]
    fn test_alpha_larger_than_ksize_rejected() {
        let config = KadConfig { ksize: 2, alpha: 3, ..Default::default() };
        assert!(matches!(config.validate(), Err(KadError::OutOfRange { .. })));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: KadConfig = toml::from_str("ksize = 8\nalpha = 2\n").unwrap();
        assert_eq!(config.ksize, 8);
        assert_eq!(config.alpha, 2);
        assert_eq!(config.rpc_timeout_secs, 5);
    }
}
