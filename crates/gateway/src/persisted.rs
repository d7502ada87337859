//! Read-through persisted cache with negative-result memoization.
//!
//! [`PersistedCache`] sits between the front cache and the authoritative
//! layer. It answers reads from the [`PersistedCardStore`] while records are
//! fresh, refreshes them from the inner layer once they expire, and writes
//! every outcome back:
//!
//! ```text
//!  get(id)
//!    │
//!    ├─ row soft-deleted ─────────────────► NotFound
//!    ├─ row expired ──► delete_by_id ──┐
//!    ├─ row negative ─────────────────────► memoized error
//!    ├─ row positive ─────────────────────► card
//!    └─ no row ────────────────────────────┤
//!                                          ▼
//!                               inner.get(id)
//!                          ok │            │ err
//!             add(positive) ◄─┘            └─► add(negative) if cacheable
//! ```
//!
//! Search follows the same shape keyed by criteria: any expired row in the
//! matched set invalidates the whole set, and a failed refresh memoizes one
//! negative row per requested identity.
//!
//! Which failures are memoized is decided by [`NegativeCachePolicy`]: not
//! found and authority service codes always are, transport failures never
//! are, and timeouts only when the policy opts in.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use cardgate_storage::{
    CachedRecord, Card, Clock, CreateCardRequest, Criteria, ErrorCode, PersistedCardStore, RecordPayload,
    RevokeCardRequest, SystemClock,
};
use fail::fail_point;
use serde::{Deserialize, Serialize};

use crate::{
    context::CallContext,
    error::{GatewayError, GatewayResult},
    service::CardService,
};

/// Default lifetime of expiring persisted records.
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(3600);

/// Decides which inner-layer failures become negative cache entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NegativeCachePolicy {
    /// Memoize timeouts under [`ErrorCode::AUTHORITY_TIMEOUT`].
    #[serde(default)]
    pub cache_timeouts: bool,
}

impl NegativeCachePolicy {
    /// Returns the code to memoize for `err`, or `None` if it must not be
    /// cached.
    #[must_use]
    pub fn code_for(&self, err: &GatewayError) -> Option<ErrorCode> {
        match err {
            GatewayError::NotFound { .. } => Some(ErrorCode::ENTITY_NOT_FOUND),
            GatewayError::Authority { code, .. } => Some(*code),
            GatewayError::Timeout { .. } if self.cache_timeouts => Some(ErrorCode::AUTHORITY_TIMEOUT),
            _ => None,
        }
    }
}

/// Whether mutations pass through this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Create and revoke are refused with [`GatewayError::Forbidden`].
    ReadOnly,
    /// Create and revoke go to the inner layer and are mirrored locally.
    WriteThrough,
}

fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Persisted read-through cache over an inner [`CardService`].
pub struct PersistedCache {
    inner: Arc<dyn CardService>,
    store: Arc<dyn PersistedCardStore>,
    clock: Arc<dyn Clock>,
    cache_duration: Duration,
    negative_cache: NegativeCachePolicy,
    writes: WritePolicy,
}

#[bon::bon]
impl PersistedCache {
    /// Creates a persisted cache layer.
    ///
    /// # Optional Fields
    ///
    /// * `clock` - Time source for expiry (default: system clock).
    /// * `cache_duration` - Lifetime of expiring records (default: 1 hour).
    /// * `negative_cache` - Which failures to memoize (default: no timeouts).
    /// * `writes` - Mutation handling (default: write-through).
    #[builder]
    pub fn new(
        inner: Arc<dyn CardService>,
        store: Arc<dyn PersistedCardStore>,
        #[builder(default = system_clock())] clock: Arc<dyn Clock>,
        #[builder(default = DEFAULT_CACHE_DURATION)] cache_duration: Duration,
        #[builder(default)] negative_cache: NegativeCachePolicy,
        #[builder(default = WritePolicy::WriteThrough)] writes: WritePolicy,
    ) -> Self {
        Self { inner, store, clock, cache_duration, negative_cache, writes }
    }

    /// Fetches `card_id` from the inner layer and records the outcome.
    async fn refresh_card(&self, ctx: &CallContext, card_id: &str) -> GatewayResult<Card> {
        fail_point!("persisted-before-remote-fetch", |_| {
            Err(GatewayError::Transport { message: "persisted-before-remote-fetch".to_owned(), source: None })
        });

        match self.inner.get(ctx, card_id).await {
            Ok(card) => {
                let record = CachedRecord::positive(card.clone(), self.clock.now(), self.cache_duration)?;
                self.store.add(record).await?;
                tracing::debug!(card_id, "persisted refreshed card");
                Ok(card)
            },
            Err(err) => {
                if let Some(code) = self.negative_cache.code_for(&err) {
                    let record =
                        CachedRecord::negative_for_card(card_id, code, self.clock.now(), self.cache_duration);
                    match self.store.add(record).await {
                        Ok(()) => tracing::debug!(card_id, error_code = %code, "memoized failed lookup"),
                        Err(store_err) => tracing::warn!(
                            card_id,
                            error = %store_err,
                            "failed to memoize lookup failure",
                        ),
                    }
                }
                Err(err)
            },
        }
    }

    /// Runs `criteria` against the inner layer and records the outcome.
    async fn refresh_search(&self, ctx: &CallContext, criteria: &Criteria) -> GatewayResult<Vec<Card>> {
        fail_point!("persisted-before-remote-fetch", |_| {
            Err(GatewayError::Transport { message: "persisted-before-remote-fetch".to_owned(), source: None })
        });

        match self.inner.search(ctx, criteria).await {
            Ok(cards) => {
                let now = self.clock.now();
                for card in &cards {
                    self.store.add(CachedRecord::positive(card.clone(), now, self.cache_duration)?).await?;
                }
                tracing::debug!(found = cards.len(), "persisted refreshed search");
                Ok(cards)
            },
            Err(err) => {
                if let Some(code) = self.negative_cache.code_for(&err) {
                    let now = self.clock.now();
                    for identity in &criteria.identities {
                        let record = CachedRecord::negative_for_identity(
                            identity.clone(),
                            criteria.identity_type.clone(),
                            criteria.effective_scope(),
                            code,
                            now,
                            self.cache_duration,
                        );
                        if let Err(store_err) = self.store.add(record).await {
                            tracing::warn!(identity, error = %store_err, "failed to memoize search failure");
                        }
                    }
                    tracing::debug!(
                        identities = criteria.identities.len(),
                        error_code = %code,
                        "memoized failed search",
                    );
                }
                Err(err)
            },
        }
    }

    fn ensure_writable(&self) -> GatewayResult<()> {
        match self.writes {
            WritePolicy::WriteThrough => Ok(()),
            WritePolicy::ReadOnly => Err(GatewayError::forbidden("this gateway does not accept card mutations")),
        }
    }
}

impl std::fmt::Debug for PersistedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedCache")
            .field("cache_duration", &self.cache_duration)
            .field("negative_cache", &self.negative_cache)
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CardService for PersistedCache {
    #[tracing::instrument(name = "persisted_get", skip(self, ctx), fields(cache = "persisted"))]
    async fn get(&self, ctx: &CallContext, card_id: &str) -> GatewayResult<Card> {
        if let Some(record) = self.store.get(card_id).await? {
            if record.deleted {
                tracing::debug!(card_id, "persisted hit on revoked card");
                return Err(GatewayError::not_found(format!("card {card_id}")));
            }
            if record.is_expired(self.clock.now()) {
                tracing::debug!(card_id, "persisted record expired");
                self.store.delete_by_id(card_id).await?;
            } else {
                return match record.payload {
                    RecordPayload::Positive(card) => {
                        tracing::debug!(card_id, "persisted hit");
                        Ok(card)
                    },
                    RecordPayload::Negative(code) => {
                        tracing::debug!(card_id, error_code = %code, "persisted negative hit");
                        Err(GatewayError::memoized(code, format!("card {card_id}")))
                    },
                };
            }
        }

        self.refresh_card(ctx, card_id).await
    }

    #[tracing::instrument(name = "persisted_search", skip(self, ctx), fields(cache = "persisted"))]
    async fn search(&self, ctx: &CallContext, criteria: &Criteria) -> GatewayResult<Vec<Card>> {
        let criteria = criteria.normalized();
        let records = self.store.find(&criteria).await?;

        if !records.is_empty() {
            let now = self.clock.now();
            if records.iter().any(|record| record.is_expired(now)) {
                let removed = self.store.delete_by_search(&criteria).await?;
                tracing::debug!(removed, "persisted search set expired");
            } else {
                let mut memoized = None;
                let mut cards = Vec::with_capacity(records.len());
                for record in records.into_iter().filter(|record| !record.deleted) {
                    match record.payload {
                        RecordPayload::Positive(card) => cards.push(card),
                        RecordPayload::Negative(code) => {
                            memoized.get_or_insert((code, record.identity));
                        },
                    }
                }
                if cards.is_empty()
                    && let Some((code, identity)) = memoized
                {
                    tracing::debug!(error_code = %code, "persisted negative search hit");
                    return Err(GatewayError::memoized(code, format!("cards for {identity}")));
                }
                tracing::debug!(found = cards.len(), "persisted search hit");
                return Ok(cards);
            }
        }

        self.refresh_search(ctx, &criteria).await
    }

    #[tracing::instrument(name = "persisted_create", skip_all, fields(cache = "persisted"))]
    async fn create(&self, ctx: &CallContext, request: &CreateCardRequest) -> GatewayResult<Card> {
        self.ensure_writable()?;

        let card = match self.inner.create(ctx, request).await {
            Ok(card) => card,
            Err(err) => {
                tracing::debug!(error_code = ?err.code(), error = %err, "create rejected upstream");
                return Err(err);
            },
        };
        let record = CachedRecord::positive(card.clone(), self.clock.now(), self.cache_duration)?;
        self.store.add(record).await?;
        tracing::info!(card_id = %card.id, "card created");
        Ok(card)
    }

    #[tracing::instrument(name = "persisted_revoke", skip_all, fields(cache = "persisted", card_id = %request.card_id))]
    async fn revoke(&self, ctx: &CallContext, request: &RevokeCardRequest) -> GatewayResult<()> {
        self.ensure_writable()?;

        self.inner.revoke(ctx, request).await?;
        if !self.store.mark_deleted(&request.card_id).await? {
            tracing::debug!(card_id = %request.card_id, "revoked card had no local record");
        }
        tracing::info!(
            card_id = %request.card_id,
            reason = %request.info.revocation_reason,
            "card revoked",
        );
        Ok(())
    }
}
