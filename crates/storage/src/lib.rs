//! Card model and storage layers for the cardgate gateway.
//!
//! This crate provides the data types shared by every gateway layer and the
//! two stores the gateway caches into: a durable [`PersistedCardStore`] and a
//! disposable [`EphemeralCache`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway layers                          │
//! │        (front cache, read-through engine, local issue)      │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │       EphemeralCache         │     PersistedCardStore       │
//! │   (get_raw, set_raw, del)    │  (get, find, add, deletes)   │
//! ├──────────────────────────────┼───────────────┬──────────────┤
//! │          MokaCache           │ MemoryCardStore│SqliteCardStore│
//! │        (in-process)          │   (testing)    │ (deployments) │
//! └──────────────────────────────┴───────────────┴──────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use cardgate_storage::{
//!     CachedRecord, Criteria, ErrorCode, MemoryCardStore, PersistedCardStore, Scope,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryCardStore::new();
//!     let now = chrono::Utc::now();
//!
//!     // Remember that nobody publishes a card for "alice".
//!     store
//!         .add(CachedRecord::negative_for_identity(
//!             "alice",
//!             None,
//!             Scope::Application,
//!             ErrorCode::ENTITY_NOT_FOUND,
//!             now,
//!             Duration::from_secs(3600),
//!         ))
//!         .await?;
//!
//!     let rows = store.find(&Criteria::new(["alice"])).await?;
//!     assert_eq!(rows[0].error_code(), Some(ErrorCode::ENTITY_NOT_FOUND));
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` and `conformance` modules with card fixtures,
//!   assertion macros and the store conformance suite. Enable this in `[dev-dependencies]` for
//!   integration tests.

#![deny(unsafe_code)]

pub mod card;
pub mod clock;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod ephemeral;
pub mod error;
pub mod memory;
pub mod record;
pub mod sqlite;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use card::{
    CARD_VERSION, Card, CardInfo, CardMeta, CreateCardRequest, DeviceInfo, RevocationInfo,
    RevokeCardRequest, SignableRequest, Signatures,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ephemeral::{
    EphemeralCache, EphemeralCacheExt, FrontCacheConfig, FrontCacheConfigBuilder, MokaCache,
};
pub use error::{BoxError, CacheError, CacheResult, ConfigError, StorageError, StorageResult};
pub use memory::MemoryCardStore;
pub use record::{CachedRecord, PERMANENT_EXPIRY_SECS, RecordPayload, permanent_expiry};
pub use sqlite::SqliteCardStore;
pub use store::PersistedCardStore;
pub use types::{Criteria, ErrorCode, Scope};
