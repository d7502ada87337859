//! Ephemeral front cache layer.
//!
//! [`FrontCache`] wraps any [`CardService`] with an [`EphemeralCache`]. It is
//! a pure accelerator: every answer it serves was produced by the inner layer
//! earlier, and any cache failure degrades to a miss.
//!
//! # Keys
//!
//! | Entry        | Key parts                                            | Value            |
//! |--------------|------------------------------------------------------|------------------|
//! | Card         | `card`, owner, card id                               | [`Card`]         |
//! | Search       | `search`, owner, type, scope, ids                    | card id list     |
//!
//! Both entry kinds are scoped to the caller's owner, so a search entry always
//! resolves through card entries written for the same owner. Search
//! identities are sorted and deduplicated first, so identity order never
//! changes the key. A search entry only answers a query if every card id
//! it lists is still present under its own card key; one missing card turns
//! the whole search into a miss.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use cardgate_storage::{
    Card, CreateCardRequest, Criteria, EphemeralCache, EphemeralCacheExt, RevokeCardRequest,
};

use crate::{context::CallContext, error::GatewayResult, service::CardService};

/// Separates key parts; cannot appear in ids, identities or owners in practice.
const KEY_SEPARATOR: &str = "\u{1f}";

/// Point-in-time front cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontCacheStats {
    /// Reads answered from the cache.
    pub hits: u64,
    /// Reads passed to the inner layer.
    pub misses: u64,
    /// Cache reads or writes that failed and were ignored.
    pub degraded: u64,
}

/// Live front cache counters shared between the layer and its owner.
///
/// All counters use `Ordering::Relaxed`; a snapshot may be momentarily
/// inconsistent across fields.
#[derive(Debug, Default)]
pub struct FrontCacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    degraded: AtomicU64,
}

impl FrontCacheCounters {
    /// Returns the current counter values.
    pub fn snapshot(&self) -> FrontCacheStats {
        FrontCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
        }
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }
}

/// Front cache over an inner [`CardService`].
pub struct FrontCache {
    inner: Arc<dyn CardService>,
    cache: Arc<dyn EphemeralCache>,
    ttl: Duration,
    counters: Arc<FrontCacheCounters>,
}

impl FrontCache {
    /// Creates a front cache storing entries for `ttl`.
    pub fn new(inner: Arc<dyn CardService>, cache: Arc<dyn EphemeralCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl, counters: Arc::default() }
    }

    /// Returns the live counters of this layer.
    pub fn counters(&self) -> Arc<FrontCacheCounters> {
        Arc::clone(&self.counters)
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> FrontCacheStats {
        self.counters.snapshot()
    }

    async fn cached_card(&self, key: &str) -> Option<Card> {
        match self.cache.get_json::<Card>(key).await {
            Ok(card) => card,
            Err(err) => {
                self.counters.degraded();
                tracing::warn!(error = %err, "front cache read failed, treating as miss");
                None
            },
        }
    }

    /// Resolves a cached search, or `None` unless every listed card is cached.
    async fn cached_search(&self, owner: &str, key: &str) -> Option<Vec<Card>> {
        let ids = match self.cache.get_json::<Vec<String>>(key).await {
            Ok(ids) => ids?,
            Err(err) => {
                self.counters.degraded();
                tracing::warn!(error = %err, "front cache read failed, treating as miss");
                return None;
            },
        };

        let mut cards = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.cached_card(&card_key(owner, id)).await {
                Some(card) => cards.push(card),
                None => {
                    tracing::debug!(card_id = %id, "front cache search entry incomplete");
                    return None;
                },
            }
        }
        Some(cards)
    }

    async fn put<T>(&self, key: &str, value: &T)
    where
        T: serde::Serialize + Sync + ?Sized,
    {
        if let Err(err) = self.cache.set_json(key, value, self.ttl).await {
            self.counters.degraded();
            tracing::warn!(error = %err, "front cache write failed");
        }
    }
}

impl std::fmt::Debug for FrontCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CardService for FrontCache {
    #[tracing::instrument(name = "front_get", skip(self, ctx), fields(cache = "front"))]
    async fn get(&self, ctx: &CallContext, card_id: &str) -> GatewayResult<Card> {
        let key = card_key(&ctx.owner, card_id);
        if let Some(card) = self.cached_card(&key).await {
            self.counters.hit();
            tracing::debug!(card_id, "front cache hit");
            return Ok(card);
        }

        self.counters.miss();
        let card = self.inner.get(ctx, card_id).await?;
        self.put(&key, &card).await;
        Ok(card)
    }

    #[tracing::instrument(name = "front_search", skip(self, ctx), fields(cache = "front"))]
    async fn search(&self, ctx: &CallContext, criteria: &Criteria) -> GatewayResult<Vec<Card>> {
        let criteria = criteria.normalized();
        let key = search_key(&ctx.owner, &criteria);
        if let Some(cards) = self.cached_search(&ctx.owner, &key).await {
            self.counters.hit();
            tracing::debug!(found = cards.len(), "front cache search hit");
            return Ok(cards);
        }

        self.counters.miss();
        let cards = self.inner.search(ctx, &criteria).await?;
        if !cards.is_empty() {
            for card in &cards {
                self.put(&card_key(&ctx.owner, &card.id), card).await;
            }
            let ids: Vec<&str> = cards.iter().map(|card| card.id.as_str()).collect();
            self.put(&key, &ids).await;
        }
        Ok(cards)
    }

    #[tracing::instrument(name = "front_create", skip_all, fields(cache = "front"))]
    async fn create(&self, ctx: &CallContext, request: &CreateCardRequest) -> GatewayResult<Card> {
        let card = self.inner.create(ctx, request).await?;
        self.put(&card_key(&ctx.owner, &card.id), &card).await;
        Ok(card)
    }

    #[tracing::instrument(name = "front_revoke", skip_all, fields(cache = "front", card_id = %request.card_id))]
    async fn revoke(&self, ctx: &CallContext, request: &RevokeCardRequest) -> GatewayResult<()> {
        self.inner.revoke(ctx, request).await?;
        if let Err(err) = self.cache.del(&card_key(&ctx.owner, &request.card_id)).await {
            self.counters.degraded();
            tracing::warn!(error = %err, "front cache eviction failed");
        }
        Ok(())
    }
}

fn card_key(owner: &str, card_id: &str) -> String {
    ["card", owner, card_id].join(KEY_SEPARATOR)
}

/// Builds the search key from normalized criteria.
fn search_key(owner: &str, criteria: &Criteria) -> String {
    let scope = criteria.effective_scope();
    let identity_type = match &criteria.identity_type {
        Some(identity_type) => format!("={identity_type}"),
        None => "*".to_owned(),
    };

    let mut parts = vec!["search", owner, identity_type.as_str(), scope.as_str()];
    parts.extend(criteria.identities.iter().map(String::as_str));
    parts.join(KEY_SEPARATOR)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use bytes::Bytes;
    use cardgate_remote::{MemoryAuthority, Operation, RemoteConfig};
    use cardgate_storage::{
        CacheError, CacheResult, FrontCacheConfig, MokaCache, Scope, testutil::card_fixture,
    };

    use super::*;
    use crate::upstream::RemoteAuthority;

    fn front_over(authority: &MemoryAuthority, cache: Arc<dyn EphemeralCache>) -> FrontCache {
        let remote = RemoteAuthority::new(Arc::new(authority.clone()), RemoteConfig::default());
        FrontCache::new(Arc::new(remote), cache, Duration::from_secs(60))
    }

    struct BrokenCache;

    #[async_trait]
    impl EphemeralCache for BrokenCache {
        async fn get_raw(&self, _key: &str) -> CacheResult<Option<Bytes>> {
            Err(CacheError::unavailable("down"))
        }

        async fn set_raw(&self, _key: &str, _value: Bytes, _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::unavailable("down"))
        }

        async fn del(&self, _key: &str) -> CacheResult<()> {
            Err(CacheError::unavailable("down"))
        }
    }

    #[tokio::test]
    async fn repeated_get_is_served_from_cache() {
        let authority = MemoryAuthority::new();
        authority.insert(card_fixture("c1", "alice", "username", Scope::Application));
        let front = front_over(&authority, Arc::new(MokaCache::new(&FrontCacheConfig::default())));
        let ctx = CallContext::new("tenant");

        front.get(&ctx, "c1").await.unwrap();
        front.get(&ctx, "c1").await.unwrap();

        assert_eq!(authority.calls(Operation::Get), 1);
        assert_eq!(front.stats(), FrontCacheStats { hits: 1, misses: 1, degraded: 0 });
    }

    #[tokio::test]
    async fn missing_card_entry_refetches_whole_search() {
        let authority = MemoryAuthority::new();
        authority.insert(card_fixture("c1", "alice", "username", Scope::Application));
        authority.insert(card_fixture("c2", "alice", "email", Scope::Application));
        let cache = Arc::new(MokaCache::new(&FrontCacheConfig::default()));
        let front = front_over(&authority, cache.clone());
        let ctx = CallContext::new("tenant");
        let criteria = Criteria::new(["alice"]);

        assert_eq!(front.search(&ctx, &criteria).await.unwrap().len(), 2);
        assert_eq!(front.search(&ctx, &criteria).await.unwrap().len(), 2);
        assert_eq!(authority.calls(Operation::Search), 1);

        cache.del(&card_key("tenant", "c2")).await.unwrap();
        assert_eq!(front.search(&ctx, &criteria).await.unwrap().len(), 2);
        assert_eq!(authority.calls(Operation::Search), 2);
    }

    #[tokio::test]
    async fn global_search_entries_resolve_per_tenant() {
        let authority = MemoryAuthority::new();
        authority.insert(card_fixture("g1", "alice@example.com", "email", Scope::Global));
        let cache = Arc::new(MokaCache::new(&FrontCacheConfig::default()));
        let front = front_over(&authority, cache.clone());
        let criteria = Criteria::new(["alice@example.com"]).with_scope(Scope::Global);
        let (t1, t2) = (CallContext::new("t1"), CallContext::new("t2"));

        front.search(&t1, &criteria).await.unwrap();
        assert!(cache.get_raw(&search_key("t1", &criteria.normalized())).await.unwrap().is_some());
        assert!(cache.get_raw(&search_key("t2", &criteria.normalized())).await.unwrap().is_none());

        front.search(&t2, &criteria).await.unwrap();
        front.search(&t1, &criteria).await.unwrap();
        front.search(&t2, &criteria).await.unwrap();

        assert_eq!(front.stats(), FrontCacheStats { hits: 2, misses: 2, degraded: 0 });
        assert_eq!(authority.calls(Operation::Search), 2);
    }

    #[tokio::test]
    async fn empty_search_results_are_not_cached() {
        let authority = MemoryAuthority::new();
        let front = front_over(&authority, Arc::new(MokaCache::new(&FrontCacheConfig::default())));
        let ctx = CallContext::anonymous();
        let criteria = Criteria::new(["nobody"]);

        assert!(front.search(&ctx, &criteria).await.unwrap().is_empty());
        assert!(front.search(&ctx, &criteria).await.unwrap().is_empty());
        assert_eq!(authority.calls(Operation::Search), 2);
    }

    #[tokio::test]
    async fn broken_cache_degrades_to_inner_layer() {
        let authority = MemoryAuthority::new();
        authority.insert(card_fixture("c1", "alice", "username", Scope::Application));
        let front = front_over(&authority, Arc::new(BrokenCache));
        let ctx = CallContext::anonymous();

        assert_eq!(front.get(&ctx, "c1").await.unwrap().id, "c1");
        assert_eq!(front.get(&ctx, "c1").await.unwrap().id, "c1");

        let stats = front.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.degraded, 4, "two failed reads and two failed writes");
        assert_eq!(authority.calls(Operation::Get), 2);
    }

    #[tokio::test]
    async fn failed_inner_get_is_not_cached() {
        let authority = MemoryAuthority::new();
        let front = front_over(&authority, Arc::new(MokaCache::new(&FrontCacheConfig::default())));
        let ctx = CallContext::anonymous();

        assert!(front.get(&ctx, "c1").await.is_err());
        authority.insert(card_fixture("c1", "alice", "username", Scope::Application));
        assert_eq!(front.get(&ctx, "c1").await.unwrap().id, "c1");
    }

    #[test]
    fn search_key_ignores_identity_order() {
        let a = Criteria::new(["bob", "alice", "bob"]).normalized();
        let b = Criteria::new(["alice", "bob"]).normalized();
        assert_eq!(search_key("tenant", &a), search_key("tenant", &b));
    }

    #[test]
    fn search_key_separates_owners_in_every_scope() {
        for scope in [Scope::Global, Scope::Application] {
            let criteria = Criteria::new(["alice"]).with_scope(scope).normalized();
            assert_ne!(search_key("t1", &criteria), search_key("t2", &criteria));
        }
    }

    #[test]
    fn search_key_distinguishes_type_filter() {
        let any = Criteria::new(["alice"]).normalized();
        let typed = Criteria::new(["alice"]).with_identity_type("email").normalized();
        assert_ne!(search_key("", &any), search_key("", &typed));
    }

    #[test]
    fn card_key_separates_owners() {
        assert_ne!(card_key("t1", "c1"), card_key("t2", "c1"));
        assert_ne!(card_key("a", "bc"), card_key("ab", "c"));
    }
}
