//! Deployment modes and layer composition.
//!
//! The [`Mode`] chosen at startup decides which terminal layer answers and
//! which layers sit in front of it:
//!
//! | Mode      | Layers (outermost first)                              | Countersigns |
//! |-----------|-------------------------------------------------------|--------------|
//! | `default` | guard, front cache, local authority                   | yes          |
//! | `cache`   | guard, front cache, persisted (read-only), remote     | no           |
//! | `sync`    | guard, front cache, persisted (write-through), remote | yes          |
//! | `proxy`   | guard, front cache, remote                            | no           |
//!
//! The front cache is omitted when disabled in [`GatewayConfig`].

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use cardgate_remote::AuthorityClient;
use cardgate_storage::{
    Card, Clock, ConfigError, CreateCardRequest, Criteria, EphemeralCache, MokaCache, PersistedCardStore,
    RevokeCardRequest, SystemClock,
};
use cardgate_validation::{RequestSigner, Validator};
use serde::{Deserialize, Serialize};

use crate::{
    config::GatewayConfig,
    context::CallContext,
    error::GatewayResult,
    front::{FrontCache, FrontCacheCounters, FrontCacheStats},
    guard::Guarded,
    local::LocalAuthority,
    persisted::{PersistedCache, WritePolicy},
    service::CardService,
    upstream::RemoteAuthority,
};

/// Deployment mode of a gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The gateway is the authority; cards are issued and stored locally.
    #[default]
    Default,
    /// Read-only cache of a remote authority.
    #[serde(alias = "app")]
    Cache,
    /// Cache of a remote authority that also forwards countersigned
    /// mutations.
    Sync,
    /// Pass-through to a remote authority with no persisted state.
    Proxy,
}

impl Mode {
    /// Returns the configuration name of this mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Cache => "cache",
            Self::Sync => "sync",
            Self::Proxy => "proxy",
        }
    }

    /// Whether mutations are countersigned before leaving the gateway.
    #[must_use]
    pub const fn signs_requests(&self) -> bool {
        matches!(self, Self::Default | Self::Sync)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown gateway mode: {0:?}")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "cache" | "app" => Ok(Self::Cache),
            "sync" => Ok(Self::Sync),
            "proxy" => Ok(Self::Proxy),
            _ => Err(UnknownMode(s.to_owned())),
        }
    }
}

fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Collaborators and configuration from which a [`Gateway`] is assembled.
///
/// Only the collaborators the configured mode needs are required; the rest
/// are ignored.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use cardgate::{GatewayConfig, Mode, ModeComposer};
/// use cardgate_remote::MemoryAuthority;
/// use cardgate_storage::MemoryCardStore;
///
/// let config = GatewayConfig::builder().mode(Mode::Cache).build();
/// let gateway = ModeComposer::builder()
///     .config(config)
///     .store(Arc::new(MemoryCardStore::new()))
///     .authority(Arc::new(MemoryAuthority::new()))
///     .build()
///     .compose()?;
/// assert_eq!(gateway.mode(), Mode::Cache);
/// # Ok::<(), cardgate_storage::ConfigError>(())
/// ```
#[derive(bon::Builder)]
pub struct ModeComposer {
    /// Gateway configuration.
    #[builder(default)]
    config: GatewayConfig,
    /// Durable record store; required by every mode except proxy.
    store: Option<Arc<dyn PersistedCardStore>>,
    /// Front cache backend; an in-process cache sized from the configuration
    /// when absent.
    front_cache: Option<Arc<dyn EphemeralCache>>,
    /// Remote authority client; required by cache, sync and proxy.
    authority: Option<Arc<dyn AuthorityClient>>,
    /// Countersigning identity; required by default and sync.
    signer: Option<Arc<dyn RequestSigner>>,
    /// Time source for record expiry.
    #[builder(default = system_clock())]
    clock: Arc<dyn Clock>,
    /// Validator replacing the one built from the configured limits.
    validator: Option<Arc<Validator>>,
}

impl ModeComposer {
    /// Validates the configuration and assembles the layer stack.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or a
    /// collaborator the mode needs was not supplied.
    pub fn compose(self) -> Result<Gateway, ConfigError> {
        self.config.validate()?;
        let mode = self.config.mode;

        let terminal: Arc<dyn CardService> = match mode {
            Mode::Default => Arc::new(LocalAuthority::new(require(mode, self.store, "persisted store")?, self.clock)),
            Mode::Cache | Mode::Sync => {
                let remote = RemoteAuthority::new(
                    require(mode, self.authority, "authority client")?,
                    self.config.remote.clone(),
                );
                let writes = if mode == Mode::Sync { WritePolicy::WriteThrough } else { WritePolicy::ReadOnly };
                Arc::new(
                    PersistedCache::builder()
                        .inner(Arc::new(remote))
                        .store(require(mode, self.store, "persisted store")?)
                        .clock(self.clock)
                        .cache_duration(self.config.cache_duration)
                        .negative_cache(self.config.negative_cache)
                        .writes(writes)
                        .build(),
                )
            },
            Mode::Proxy => Arc::new(RemoteAuthority::new(
                require(mode, self.authority, "authority client")?,
                self.config.remote.clone(),
            )),
        };

        let front_config = self.config.front_cache.to_config()?;
        let (service, front) = if front_config.enabled() {
            let cache = self.front_cache.unwrap_or_else(|| Arc::new(MokaCache::new(&front_config)));
            let layer = FrontCache::new(terminal, cache, front_config.ttl());
            let counters = layer.counters();
            (Arc::new(layer) as Arc<dyn CardService>, Some(counters))
        } else {
            (terminal, None)
        };

        let signer = if mode.signs_requests() { Some(require(mode, self.signer, "request signer")?) } else { None };
        let validator = self.validator.unwrap_or_else(|| Arc::new(Validator::new(&self.config.limits)));

        tracing::info!(
            mode = %mode,
            front_cache = front.is_some(),
            signer_id = signer.as_ref().map(|signer| signer.signer_id()),
            "gateway composed",
        );

        Ok(Gateway { mode, service: Arc::new(Guarded::new(service, validator, signer)), front })
    }
}

fn require<T>(mode: Mode, value: Option<T>, dependency: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::MissingDependency { mode: mode.as_str(), dependency })
}

/// A composed gateway; the single [`CardService`] callers talk to.
#[derive(Clone)]
pub struct Gateway {
    mode: Mode,
    service: Arc<dyn CardService>,
    front: Option<Arc<FrontCacheCounters>>,
}

impl Gateway {
    /// Returns the mode this gateway was composed for.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns front cache counters, or `None` if the front cache is disabled.
    #[must_use]
    pub fn front_cache_stats(&self) -> Option<FrontCacheStats> {
        self.front.as_ref().map(|counters| counters.snapshot())
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("mode", &self.mode)
            .field("front_cache", &self.front_cache_stats())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CardService for Gateway {
    async fn get(&self, ctx: &CallContext, card_id: &str) -> GatewayResult<Card> {
        self.service.get(ctx, card_id).await
    }

    async fn search(&self, ctx: &CallContext, criteria: &Criteria) -> GatewayResult<Vec<Card>> {
        self.service.search(ctx, criteria).await
    }

    async fn create(&self, ctx: &CallContext, request: &CreateCardRequest) -> GatewayResult<Card> {
        self.service.create(ctx, request).await
    }

    async fn revoke(&self, ctx: &CallContext, request: &RevokeCardRequest) -> GatewayResult<()> {
        self.service.revoke(ctx, request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use cardgate_remote::MemoryAuthority;
    use cardgate_storage::MemoryCardStore;
    use cardgate_validation::Ed25519Signer;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("default", Mode::Default)]
    #[case("cache", Mode::Cache)]
    #[case("app", Mode::Cache)]
    #[case("SYNC", Mode::Sync)]
    #[case("proxy", Mode::Proxy)]
    fn parses_mode_names(#[case] name: &str, #[case] expected: Mode) {
        assert_eq!(name.parse::<Mode>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert_eq!("mirror".parse::<Mode>(), Err(UnknownMode("mirror".to_owned())));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for mode in [Mode::Default, Mode::Cache, Mode::Sync, Mode::Proxy] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }

    #[rstest]
    #[case(Mode::Default, "persisted store")]
    #[case(Mode::Cache, "authority client")]
    #[case(Mode::Sync, "authority client")]
    #[case(Mode::Proxy, "authority client")]
    fn missing_collaborators_are_reported(#[case] mode: Mode, #[case] missing: &str) {
        let err = ModeComposer::builder()
            .config(GatewayConfig::builder().mode(mode).build())
            .build()
            .compose()
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingDependency { dependency, .. } if dependency == missing),
            "unexpected error: {err:?}"
        );
    }

    #[rstest]
    #[case(Mode::Default)]
    #[case(Mode::Sync)]
    fn signing_modes_require_a_signer(#[case] mode: Mode) {
        let err = ModeComposer::builder()
            .config(GatewayConfig::builder().mode(mode).build())
            .store(Arc::new(MemoryCardStore::new()))
            .authority(Arc::new(MemoryAuthority::new()))
            .build()
            .compose()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingDependency { dependency: "request signer", .. }));
    }

    #[test]
    fn disabled_front_cache_has_no_stats() {
        let mut config = GatewayConfig::builder().mode(Mode::Proxy).build();
        config.front_cache.enabled = false;
        let gateway = ModeComposer::builder()
            .config(config)
            .authority(Arc::new(MemoryAuthority::new()))
            .build()
            .compose()
            .unwrap();
        assert_eq!(gateway.front_cache_stats(), None);
    }

    #[test]
    fn default_mode_composes_with_signer_and_store() {
        let gateway = ModeComposer::builder()
            .store(Arc::new(MemoryCardStore::new()))
            .signer(Arc::new(Ed25519Signer::generate("gateway")))
            .build()
            .compose()
            .unwrap();
        assert_eq!(gateway.mode(), Mode::Default);
        assert_eq!(gateway.front_cache_stats(), Some(FrontCacheStats::default()));
    }
}
