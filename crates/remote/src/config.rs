//! Configuration for calls to the remote authority.

use std::time::Duration;

use cardgate_storage::ConfigError;
use serde::{Deserialize, Serialize};

/// Default budget for one authority call, retries included.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default delay before the first retry.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Default ceiling on any single retry delay.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Retry policy for transient authority failures.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use cardgate_remote::RetryConfig;
///
/// let config = RetryConfig::builder()
///     .max_retries(3)
///     .initial_backoff(Duration::from_millis(20))
///     .build()?;
/// assert_eq!(config.max_retries, 3);
/// # Ok::<(), cardgate_storage::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt; zero disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles with every further attempt.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub initial_backoff: Duration,

    /// Ceiling on a single delay, before jitter.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub max_backoff: Duration,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

#[bon::bon]
impl RetryConfig {
    /// Creates a retry policy, validating the backoff range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `initial_backoff` is zero
    /// - `initial_backoff` exceeds `max_backoff`
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_RETRIES)] max_retries: u32,
        #[builder(default = DEFAULT_INITIAL_BACKOFF)] initial_backoff: Duration,
        #[builder(default = DEFAULT_MAX_BACKOFF)] max_backoff: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_retries, initial_backoff, max_backoff };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_backoff.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "initial_backoff",
                value: "0ms".to_owned(),
                min: "1ms".to_owned(),
            });
        }
        if self.initial_backoff > self.max_backoff {
            return Err(ConfigError::InvertedRange {
                min_field: "initial_backoff",
                min: format!("{:?}", self.initial_backoff),
                max_field: "max_backoff",
                max: format!("{:?}", self.max_backoff),
            });
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Settings for talking to the remote authority.
///
/// `timeout` bounds a whole call including every retry and backoff sleep. A
/// caller deadline that falls earlier takes precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Budget for one call, retries included.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

#[bon::bon]
impl RemoteConfig {
    /// Creates remote settings, validating the timeout and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `timeout` is zero or `retry` is invalid.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_TIMEOUT)] timeout: Duration,
        #[builder(default)] retry: RetryConfig,
    ) -> Result<Self, ConfigError> {
        let config = Self { timeout, retry };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "timeout",
                value: "0ms".to_owned(),
                min: "1ms".to_owned(),
            });
        }
        self.retry.validate()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT, retry: RetryConfig::default() }
    }
}
