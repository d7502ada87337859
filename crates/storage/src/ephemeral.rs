//! Ephemeral key/value cache used as the gateway's front cache.
//!
//! [`EphemeralCache`] is a minimal string-keyed byte cache with per-entry
//! expiry. [`EphemeralCacheExt`] layers JSON encoding on top so callers can
//! store typed values. [`MokaCache`] is the in-process implementation.
//!
//! Entries are disposable: losing one only costs a slower read, so callers
//! are expected to treat every [`CacheError`] as a miss.
//!
//! # Usage
//!
//! ```no_run
//! # use std::time::Duration;
//! # use cardgate_storage::{EphemeralCacheExt, FrontCacheConfig, MokaCache};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FrontCacheConfig::builder()
//!     .max_entries(10_000)
//!     .ttl(Duration::from_secs(60))
//!     .build()?;
//! let cache = MokaCache::new(&config);
//!
//! cache.set_json("greeting", &"hello", config.ttl()).await?;
//! let value: Option<String> = cache.get_json("greeting").await?;
//! assert_eq!(value.as_deref(), Some("hello"));
//! # Ok(())
//! # }
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use moka::{Expiry, future::Cache};
use serde::{Serialize, de::DeserializeOwned};
use tracing::trace;

use crate::error::{CacheResult, ConfigError};

/// String-keyed byte cache with per-entry time-to-live.
#[async_trait]
pub trait EphemeralCache: Send + Sync {
    /// Returns the bytes stored under `key`, or `None` on a miss.
    async fn get_raw(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Stores `value` under `key` for at most `ttl`.
    async fn set_raw(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn del(&self, key: &str) -> CacheResult<()>;
}

/// JSON helpers for any [`EphemeralCache`].
#[async_trait]
pub trait EphemeralCacheExt: EphemeralCache {
    /// Reads and decodes a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encoding`](crate::CacheError::Encoding) if the
    /// stored bytes do not decode as `T`, or the backend error on failure.
    async fn get_json<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_raw(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encodes `value` as JSON and stores it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encoding`](crate::CacheError::Encoding) if
    /// `value` cannot be encoded, or the backend error on failure.
    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        self.set_raw(key, Bytes::from(bytes), ttl).await
    }
}

impl<C: EphemeralCache + ?Sized> EphemeralCacheExt for C {}

// ───────────────────────────────────────────────────────────────────────────
// FrontCacheConfig
// ───────────────────────────────────────────────────────────────────────────

/// Default maximum number of front cache entries.
const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Default front cache TTL.
const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Minimum allowed front cache TTL.
const MIN_TTL: Duration = Duration::from_secs(1);

/// Configuration for the front cache.
///
/// # Validation
///
/// - `max_entries` must be >= 1
/// - `ttl` must be >= 1 second
///
/// Use [`FrontCacheConfig::disabled()`] to turn the front cache off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontCacheConfig {
    max_entries: u64,
    ttl: Duration,
    enabled: bool,
}

impl FrontCacheConfig {
    /// Returns a builder initialised with the defaults.
    pub fn builder() -> FrontCacheConfigBuilder {
        FrontCacheConfigBuilder { max_entries: DEFAULT_MAX_ENTRIES, ttl: DEFAULT_TTL }
    }

    /// Creates a disabled configuration.
    pub fn disabled() -> Self {
        Self { max_entries: 0, ttl: Duration::ZERO, enabled: false }
    }

    /// Returns the maximum number of entries.
    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    /// Returns the entry TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns whether the front cache is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for FrontCacheConfig {
    fn default() -> Self {
        Self { max_entries: DEFAULT_MAX_ENTRIES, ttl: DEFAULT_TTL, enabled: true }
    }
}

/// Builder for [`FrontCacheConfig`].
#[derive(Debug, Clone)]
pub struct FrontCacheConfigBuilder {
    max_entries: u64,
    ttl: Duration,
}

impl FrontCacheConfigBuilder {
    /// Sets the maximum number of entries in the cache.
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the TTL for cache entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Builds the [`FrontCacheConfig`], validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `max_entries` is 0
    /// - `ttl` is less than 1 second
    pub fn build(self) -> Result<FrontCacheConfig, ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_entries",
                value: self.max_entries.to_string(),
                min: "1".to_owned(),
            });
        }
        if self.ttl < MIN_TTL {
            return Err(ConfigError::BelowMinimum {
                field: "ttl",
                value: format!("{}ms", self.ttl.as_millis()),
                min: "1s".to_owned(),
            });
        }
        Ok(FrontCacheConfig { max_entries: self.max_entries, ttl: self.ttl, enabled: true })
    }
}

// ───────────────────────────────────────────────────────────────────────────
// MokaCache
// ───────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Entry {
    value: Bytes,
    ttl: Duration,
}

/// Applies each entry's own TTL.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process [`EphemeralCache`] backed by [`moka`].
///
/// A disabled configuration yields a cache that stores nothing and misses on
/// every read.
#[derive(Clone)]
pub struct MokaCache {
    cache: Option<Cache<String, Entry>>,
    config: FrontCacheConfig,
}

impl MokaCache {
    /// Creates a cache sized and bounded by `config`.
    pub fn new(config: &FrontCacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            Cache::builder().max_capacity(config.max_entries).expire_after(PerEntryTtl).build()
        });
        Self { cache, config: config.clone() }
    }

    /// Returns cache statistics: `(current_entries, max_entries)`.
    pub fn cache_stats(&self) -> (u64, u64) {
        let count = self.cache.as_ref().map_or(0, |c| c.entry_count());
        (count, self.config.max_entries)
    }

    /// Invalidates all entries.
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }
}

impl std::fmt::Debug for MokaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCache").field("config", &self.config).finish_non_exhaustive()
    }
}

#[async_trait]
impl EphemeralCache for MokaCache {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let hit = cache.get(key).await.map(|entry| entry.value);
        trace!(key, hit = hit.is_some(), "front cache lookup");
        Ok(hit)
    }

    async fn set_raw(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()> {
        if let Some(cache) = &self.cache {
            let ttl = ttl.min(self.config.ttl);
            if !ttl.is_zero() {
                cache.insert(key.to_owned(), Entry { value, ttl }).await;
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        if let Some(cache) = &self.cache {
            cache.invalidate(key).await;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn test_config() -> FrontCacheConfig {
        FrontCacheConfig::builder().max_entries(100).ttl(Duration::from_secs(60)).build().unwrap()
    }

    #[tokio::test]
    async fn set_then_get_round_trips_json() {
        let cache = MokaCache::new(&test_config());
        cache.set_json("ids", &vec!["a".to_owned(), "b".to_owned()], Duration::from_secs(5)).await.unwrap();

        let ids: Option<Vec<String>> = cache.get_json("ids").await.unwrap();
        assert_eq!(ids, Some(vec!["a".to_owned(), "b".to_owned()]));
    }

    #[tokio::test]
    async fn del_removes_entry() {
        let cache = MokaCache::new(&test_config());
        cache.set_raw("key", Bytes::from_static(b"v"), Duration::from_secs(5)).await.unwrap();
        cache.del("key").await.unwrap();
        assert_eq!(cache.get_raw("key").await.unwrap(), None);

        cache.del("never-set").await.unwrap();
    }

    #[tokio::test]
    async fn entries_expire_after_their_ttl() {
        let cache = MokaCache::new(&test_config());
        cache.set_raw("short", Bytes::from_static(b"v"), Duration::from_millis(50)).await.unwrap();
        assert!(cache.get_raw("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get_raw("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn undecodable_value_is_an_encoding_error() {
        let cache = MokaCache::new(&test_config());
        cache.set_raw("key", Bytes::from_static(b"not json"), Duration::from_secs(5)).await.unwrap();
        let result: CacheResult<Option<Vec<String>>> = cache.get_json("key").await;
        assert!(matches!(result, Err(crate::CacheError::Encoding { .. })));
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = MokaCache::new(&FrontCacheConfig::disabled());
        cache.set_raw("key", Bytes::from_static(b"v"), Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get_raw("key").await.unwrap(), None);
        assert_eq!(cache.cache_stats(), (0, 0));
    }

    #[test]
    fn config_validation() {
        assert!(FrontCacheConfig::builder().max_entries(0).build().is_err());
        assert!(FrontCacheConfig::builder().ttl(Duration::from_millis(500)).build().is_err());
        assert!(FrontCacheConfig::builder().max_entries(1).ttl(Duration::from_secs(1)).build().is_ok());
    }
}
