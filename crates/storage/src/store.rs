//! Persistence trait for cached card records.
//!
//! This module provides the [`PersistedCardStore`] trait that abstracts the
//! durable layer beneath the gateway's read-through cache. Implementations can
//! use different backends (SQLite for deployments, in-memory for tests).
//!
//! # Row Identity
//!
//! ```text
//! ┌──────────────────────────┐      ┌───────────────────────────────────┐
//! │  card_id = Some(id)      │      │  card_id = None                   │
//! │  one row per card id     │      │  one row per                      │
//! │  (positive or negative)  │      │  (identity, identity_type, scope) │
//! └──────────────────────────┘      └───────────────────────────────────┘
//! ```
//!
//! Adding a record whose key already exists replaces the previous row.
//!
//! # Usage
//!
//! ```no_run
//! use cardgate_storage::{Criteria, PersistedCardStore, StorageResult};
//!
//! async fn live_cards<S: PersistedCardStore>(store: &S, identity: &str) -> StorageResult<usize> {
//!     let rows = store.find(&Criteria::new([identity])).await?;
//!     Ok(rows.iter().filter(|row| !row.deleted && row.card().is_some()).count())
//! }
//! ```

use async_trait::async_trait;

use crate::{error::StorageResult, record::CachedRecord, types::Criteria};

/// Durable store of positive and negative card records.
///
/// Stores never interpret expiry; they return whatever rows match and leave
/// freshness decisions to the caller.
///
/// # Error Handling
///
/// Operations return [`StorageResult`]. Absence is reported as `Ok(None)`,
/// `Ok(false)` or an empty vector, never as an error.
#[async_trait]
pub trait PersistedCardStore: Send + Sync {
    /// Returns the record stored under `card_id`, if any.
    async fn get(&self, card_id: &str) -> StorageResult<Option<CachedRecord>>;

    /// Returns every record whose identity is one of `criteria.identities`,
    /// whose scope equals the effective scope and, when a type filter is set,
    /// whose identity type matches.
    ///
    /// Expired, soft-deleted and negative rows are all included.
    async fn find(&self, criteria: &Criteria) -> StorageResult<Vec<CachedRecord>>;

    /// Inserts `record`, replacing any existing row with the same key.
    async fn add(&self, record: CachedRecord) -> StorageResult<()>;

    /// Sets the deleted flag on the row for `card_id`.
    ///
    /// Returns `false` if no such row exists.
    async fn mark_deleted(&self, card_id: &str) -> StorageResult<bool>;

    /// Hard-deletes the row for `card_id`.
    ///
    /// Returns `false` if no such row exists.
    async fn delete_by_id(&self, card_id: &str) -> StorageResult<bool>;

    /// Hard-deletes every row [`find`](Self::find) would return for `criteria`.
    ///
    /// Returns the number of rows removed.
    async fn delete_by_search(&self, criteria: &Criteria) -> StorageResult<usize>;
}
