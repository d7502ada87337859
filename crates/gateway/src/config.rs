//! Gateway configuration.
//!
//! [`GatewayConfig`] is resolved once at startup, either deserialized from the
//! process configuration or assembled with its builder, and handed to
//! [`ModeComposer`](crate::ModeComposer). Nothing reads configuration after
//! composition.
//!
//! # Example
//!
//! ```
//! use cardgate::{GatewayConfig, Mode};
//!
//! let config: GatewayConfig = serde_json::from_str(
//!     r#"{
//!         "mode": "app",
//!         "cache_duration": "30m",
//!         "front_cache": { "ttl": "15s" },
//!         "remote": { "timeout": "3s" },
//!         "negative_cache": { "cache_timeouts": true }
//!     }"#,
//! )?;
//! config.validate()?;
//! assert_eq!(config.mode, Mode::Cache);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::time::Duration;

use cardgate_remote::RemoteConfig;
use cardgate_storage::{ConfigError, FrontCacheConfig};
use cardgate_validation::ValidationLimits;
use serde::{Deserialize, Serialize};

use crate::{
    mode::Mode,
    persisted::{DEFAULT_CACHE_DURATION, NegativeCachePolicy},
};

/// Minimum persisted cache duration.
const MIN_CACHE_DURATION: Duration = Duration::from_secs(1);

/// Front cache section of [`GatewayConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrontCacheSettings {
    /// Whether the front cache layer is installed.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum number of cached entries.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Lifetime of a cached entry.
    #[serde(with = "humantime_serde", default = "default_front_ttl")]
    pub ttl: Duration,
}

fn default_enabled() -> bool {
    true
}

fn default_max_entries() -> u64 {
    FrontCacheConfig::default().max_entries()
}

fn default_front_ttl() -> Duration {
    FrontCacheConfig::default().ttl()
}

impl Default for FrontCacheSettings {
    fn default() -> Self {
        Self { enabled: default_enabled(), max_entries: default_max_entries(), ttl: default_front_ttl() }
    }
}

impl FrontCacheSettings {
    /// Converts these settings into a validated [`FrontCacheConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an enabled cache has zero entries or a TTL
    /// below one second.
    pub fn to_config(&self) -> Result<FrontCacheConfig, ConfigError> {
        if !self.enabled {
            return Ok(FrontCacheConfig::disabled());
        }
        FrontCacheConfig::builder().max_entries(self.max_entries).ttl(self.ttl).build()
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Deployment mode.
    #[serde(default)]
    #[builder(default)]
    pub mode: Mode,

    /// Lifetime of expiring persisted records.
    #[serde(with = "humantime_serde", default = "default_cache_duration")]
    #[builder(default = DEFAULT_CACHE_DURATION)]
    pub cache_duration: Duration,

    /// Front cache settings.
    #[serde(default)]
    #[builder(default)]
    pub front_cache: FrontCacheSettings,

    /// Remote authority settings.
    #[serde(default)]
    #[builder(default)]
    pub remote: RemoteConfig,

    /// Which authority failures are memoized.
    #[serde(default)]
    #[builder(default)]
    pub negative_cache: NegativeCachePolicy,

    /// Field limits for the default validation rules.
    #[serde(default)]
    #[builder(default)]
    pub limits: ValidationLimits,
}

fn default_cache_duration() -> Duration {
    DEFAULT_CACHE_DURATION
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            cache_duration: DEFAULT_CACHE_DURATION,
            front_cache: FrontCacheSettings::default(),
            remote: RemoteConfig::default(),
            negative_cache: NegativeCachePolicy::default(),
            limits: ValidationLimits::default(),
        }
    }
}

impl GatewayConfig {
    /// Checks every section.
    ///
    /// Deserialized configuration bypasses the section builders, so this must
    /// run before composition; [`ModeComposer`](crate::ModeComposer) calls it.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_duration < MIN_CACHE_DURATION {
            return Err(ConfigError::BelowMinimum {
                field: "cache_duration",
                value: format!("{}ms", self.cache_duration.as_millis()),
                min: "1s".to_owned(),
            });
        }
        self.front_cache.to_config()?;
        self.remote.validate()?;
        self.limits.validate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: GatewayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config, GatewayConfig::builder().build());
        config.validate().unwrap();
    }

    #[test]
    fn app_is_an_alias_for_cache() {
        let config: GatewayConfig = serde_json::from_str(r#"{"mode": "app"}"#).unwrap();
        assert_eq!(config.mode, Mode::Cache);
    }

    #[test]
    fn short_cache_duration_is_rejected() {
        let config = GatewayConfig::builder().cache_duration(Duration::from_millis(10)).build();
        assert!(matches!(config.validate(), Err(ConfigError::BelowMinimum { field: "cache_duration", .. })));
    }

    #[test]
    fn nested_sections_are_validated() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"front_cache": {"max_entries": 0}}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::BelowMinimum { field: "max_entries", .. })));

        let config: GatewayConfig = serde_json::from_str(r#"{"limits": {"max_data_entries": 0}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn disabled_front_cache_skips_bounds() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"front_cache": {"enabled": false, "max_entries": 0}}"#).unwrap();
        config.validate().unwrap();
        assert!(!config.front_cache.to_config().unwrap().enabled());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<GatewayConfig>(r#"{"modes": "sync"}"#).is_err());
    }
}
