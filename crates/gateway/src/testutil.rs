//! Shared test utilities for exercising composed gateways.
//!
//! [`GatewayHarness`] wires a [`Gateway`] in any [`Mode`] to in-process
//! collaborators: a [`MemoryAuthority`], a [`MemoryCardStore`], a
//! [`ManualClock`] frozen at [`REFERENCE_TIMESTAMP`] and a fresh gateway
//! signer. It is feature-gated behind `testutil` to prevent leaking into
//! production builds.
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use cardgate::{Mode, testutil::GatewayHarness};
//!
//! let harness = GatewayHarness::new(Mode::Sync);
//! ```

use std::sync::Arc;

use cardgate_remote::MemoryAuthority;
use cardgate_storage::{
    ManualClock, MemoryCardStore, MokaCache, PersistedCardStore, testutil::REFERENCE_TIMESTAMP,
};
use cardgate_validation::Ed25519Signer;

use crate::{
    config::GatewayConfig,
    context::CallContext,
    mode::{Gateway, Mode, ModeComposer},
};

/// Signer id the harness gateway countersigns under.
pub const GATEWAY_SIGNER_ID: &str = "cardgate-test";

/// A composed gateway plus handles on every collaborator behind it.
pub struct GatewayHarness<S = MemoryCardStore> {
    /// The gateway under test.
    pub gateway: Gateway,
    /// Remote authority used by cache, sync and proxy modes.
    pub authority: MemoryAuthority,
    /// Persisted store used by default, cache and sync modes.
    pub store: Arc<S>,
    /// Clock driving persisted record expiry.
    pub clock: Arc<ManualClock>,
    /// Front cache backend.
    pub front: Arc<MokaCache>,
    /// Gateway signer used by default and sync modes.
    pub signer: Arc<Ed25519Signer>,
}

impl GatewayHarness {
    /// Composes a gateway in `mode` with otherwise default configuration.
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self::with_config(GatewayConfig::builder().mode(mode).build())
    }

    /// Composes a gateway from `config` over an in-memory store.
    #[must_use]
    pub fn with_config(config: GatewayConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryCardStore::new()))
    }
}

impl<S: PersistedCardStore + 'static> GatewayHarness<S> {
    /// Composes a gateway from `config` over `store`.
    #[must_use]
    pub fn with_store(config: GatewayConfig, store: Arc<S>) -> Self {
        let authority = MemoryAuthority::new();
        let clock = Arc::new(ManualClock::at_timestamp(REFERENCE_TIMESTAMP));
        let front_config = config.front_cache.to_config().unwrap_or_default();
        let front = Arc::new(MokaCache::new(&front_config));
        let signer = Arc::new(Ed25519Signer::generate(GATEWAY_SIGNER_ID));

        let gateway = ModeComposer::builder()
            .config(config)
            .store(store.clone())
            .front_cache(front.clone())
            .authority(Arc::new(authority.clone()))
            .signer(signer.clone())
            .clock(clock.clone())
            .build()
            .compose()
            .expect("harness configuration composes");

        Self { gateway, authority, store, clock, front, signer }
    }

    /// Returns a context for the default test tenant.
    #[must_use]
    pub fn ctx(&self) -> CallContext {
        CallContext::new("tenant-a")
    }
}

/// Assert that a [`GatewayResult`](crate::GatewayResult) failed with the
/// given [`GatewayError`](crate::GatewayError) variant pattern.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use cardgate::{GatewayError, GatewayResult, assert_gateway_error};
///
/// let result: GatewayResult<()> = Err(GatewayError::not_found("card c1"));
/// assert_gateway_error!(result, GatewayError::NotFound { .. });
/// ```
#[macro_export]
macro_rules! assert_gateway_error {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {},
            other => panic!("expected {}, got: {other:?}", stringify!($pattern)),
        }
    };
}

/// Assert that a [`GatewayResult`](crate::GatewayResult) failed with the
/// given wire [`ErrorCode`](cardgate_storage::ErrorCode).
#[macro_export]
macro_rules! assert_gateway_code {
    ($result:expr, $code:expr) => {
        match $result {
            Err(err) => assert_eq!(err.code(), Some($code), "unexpected error: {err:?}"),
            Ok(value) => panic!("expected error code {}, got Ok({value:?})", $code),
        }
    };
}
