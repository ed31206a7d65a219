//! Configuration for the operation coordinator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{EntitleError, Result, constants};

/// Tunables for a coordinator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// How long a completed result stays in the fast-path cache. Must cover
    /// the window in which callers are expected to retry.
    pub cache_ttl_secs: u64,
    /// Prefix prepended to the idempotency token to form the cache key.
    pub cache_key_prefix: String,
    /// Largest `duration_months` any operation may request.
    pub max_duration_months: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: constants::DEFAULT_CACHE_TTL_SECS,
            cache_key_prefix: constants::DEFAULT_CACHE_KEY_PREFIX.to_string(),
            max_duration_months: constants::DEFAULT_MAX_DURATION_MONTHS,
        }
    }
}

impl CoordinatorConfig {
    /// Check invariants the coordinator relies on.
    ///
    /// # Errors
    /// Returns [`EntitleError::Configuration`] on a zero TTL, an empty cache
    /// key prefix, or a zero duration cap.
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs == 0 {
            return Err(EntitleError::Configuration(
                "cache_ttl_secs must be > 0".into(),
            ));
        }
        if self.cache_key_prefix.is_empty() {
            return Err(EntitleError::Configuration(
                "cache_key_prefix must not be empty".into(),
            ));
        }
        if self.max_duration_months == 0 {
            return Err(EntitleError::Configuration(
                "max_duration_months must be > 0".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The cache key under which the result for `token` is stored.
    #[must_use]
    pub fn cache_key(&self, token: &str) -> String {
        format!("{}{token}", self.cache_key_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.cache_ttl_secs, 86_400);
        assert_eq!(cfg.cache_key_prefix, "idempotency:");
        assert_eq!(cfg.max_duration_months, 120);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_ttl_rejected() {
        let cfg = CoordinatorConfig {
            cache_ttl_secs: 0,
            ..CoordinatorConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, EntitleError::Configuration(_)));
    }

    #[test]
    fn empty_prefix_rejected() {
        let cfg = CoordinatorConfig {
            cache_key_prefix: String::new(),
            ..CoordinatorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cache_key_uses_prefix() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.cache_key("abc"), "idempotency:abc");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: CoordinatorConfig = serde_json::from_str(r#"{"cache_ttl_secs": 60}"#).unwrap();
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.cache_key_prefix, "idempotency:");
        assert_eq!(cfg.max_duration_months, 120);
    }
}
