//! # Cardgate
//!
//! A caching gateway in front of a remote card authority.
//!
//! Every deployment exposes the same four operations through [`CardService`]:
//! get a card by id, search cards by identity, create a card and revoke a
//! card. What answers them depends on the [`Mode`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                 Guarded  (validation, countersigning)            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                 FrontCache  (EphemeralCache, optional)           │
//! ├─────────────────────┬──────────────────────────┬─────────────────┤
//! │   LocalAuthority    │     PersistedCache       │                 │
//! │   (default mode)    │  (cache / sync modes)    │                 │
//! │                     ├──────────────────────────┤ RemoteAuthority │
//! │                     │     RemoteAuthority      │  (proxy mode)   │
//! ├─────────────────────┴──────────────────────────┴─────────────────┤
//! │        PersistedCardStore            AuthorityClient             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The persisted tier memoizes failed lookups as negative records so known-bad
//! ids and identities stop reaching the authority until their records expire.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use cardgate::{CallContext, CardService, GatewayConfig, GatewayError, Mode, ModeComposer};
//! use cardgate_remote::MemoryAuthority;
//! use cardgate_storage::MemoryCardStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let authority = Arc::new(MemoryAuthority::new());
//!     let gateway = ModeComposer::builder()
//!         .config(GatewayConfig::builder().mode(Mode::Cache).build())
//!         .store(Arc::new(MemoryCardStore::new()))
//!         .authority(authority.clone())
//!         .build()
//!         .compose()?;
//!
//!     let ctx = CallContext::new("tenant-a");
//!     assert!(matches!(gateway.get(&ctx, "unknown").await, Err(GatewayError::NotFound { .. })));
//!     // The failure was memoized; the authority is not asked again.
//!     assert!(gateway.get(&ctx, "unknown").await.is_err());
//!     assert_eq!(authority.total_calls(), 1);
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the [`testutil`] module with a mode harness and assertion macros.
//! - **`failpoints`**: Enables the `persisted-before-remote-fetch` fail point.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Gateway configuration.
pub mod config;
/// Per-call context.
pub mod context;
/// Gateway error type.
pub mod error;
/// Front cache layer.
pub mod front;
/// Validation and signing layer.
pub mod guard;
/// Local authority for the default mode.
pub mod local;
/// Deployment modes and composition.
pub mod mode;
/// Persisted read-through layer.
pub mod persisted;
/// The layer trait.
pub mod service;
/// Harness and assertion macros for tests.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
/// Remote authority layer.
pub mod upstream;

pub use config::{FrontCacheSettings, GatewayConfig};
pub use context::CallContext;
pub use error::{GatewayError, GatewayResult};
pub use front::{FrontCache, FrontCacheCounters, FrontCacheStats};
pub use guard::Guarded;
pub use local::LocalAuthority;
pub use mode::{Gateway, Mode, ModeComposer, UnknownMode};
pub use persisted::{DEFAULT_CACHE_DURATION, NegativeCachePolicy, PersistedCache, WritePolicy};
pub use service::CardService;
pub use upstream::RemoteAuthority;
