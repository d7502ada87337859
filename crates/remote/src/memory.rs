//! In-process card authority.
//!
//! [`MemoryAuthority`] behaves like a well-formed authority: it assigns card
//! ids from the snapshot fingerprint, answers searches from its own table and
//! reports unknown or revoked cards as not found. Tests drive it further with
//! injected failures, artificial latency and per-operation call counters.
//!
//! ```
//! # use cardgate_remote::{AuthorityClient, MemoryAuthority, Operation, RemoteError};
//! # async fn example() {
//! let authority = MemoryAuthority::new();
//! authority.fail_times(Operation::Get, RemoteError::transport("reset"), 1);
//!
//! assert!(authority.get_card("missing").await.is_err());
//! assert!(matches!(authority.get_card("missing").await, Err(RemoteError::NotFound { .. })));
//! assert_eq!(authority.calls(Operation::Get), 2);
//! # }
//! ```

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use cardgate_storage::{CARD_VERSION, Card, CardInfo, CardMeta, Criteria, ErrorCode, SignableRequest};
use chrono::Utc;
use parking_lot::Mutex;

use crate::{
    client::AuthorityClient,
    error::{RemoteError, RemoteResult},
};

/// An [`AuthorityClient`] operation, used to target counters and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`AuthorityClient::get_card`].
    Get,
    /// [`AuthorityClient::search_cards`].
    Search,
    /// [`AuthorityClient::create_card`].
    Create,
    /// [`AuthorityClient::revoke_card`].
    Revoke,
}

struct InjectedFailure {
    error: RemoteError,
    /// Calls left to fail; `None` fails until cleared.
    remaining: Option<u32>,
}

#[derive(Default)]
struct State {
    cards: BTreeMap<String, Card>,
    revoked: HashSet<String>,
    failures: HashMap<Operation, InjectedFailure>,
    calls: HashMap<Operation, u64>,
    latency: Duration,
}

/// In-memory [`AuthorityClient`].
///
/// Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryAuthority {
    state: Arc<Mutex<State>>,
}

impl MemoryAuthority {
    /// Creates an empty authority.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `card` as if it had been issued earlier.
    pub fn insert(&self, card: Card) {
        let mut state = self.state.lock();
        state.revoked.remove(&card.id);
        state.cards.insert(card.id.clone(), card);
    }

    /// Returns `true` if `card_id` is held and not revoked.
    #[must_use]
    pub fn contains(&self, card_id: &str) -> bool {
        let state = self.state.lock();
        state.cards.contains_key(card_id) && !state.revoked.contains(card_id)
    }

    /// Returns `true` if `card_id` has been revoked.
    #[must_use]
    pub fn is_revoked(&self, card_id: &str) -> bool {
        self.state.lock().revoked.contains(card_id)
    }

    /// Makes every call to `operation` fail with `error` until cleared.
    pub fn fail(&self, operation: Operation, error: RemoteError) {
        self.state.lock().failures.insert(operation, InjectedFailure { error, remaining: None });
    }

    /// Makes the next `times` calls to `operation` fail with `error`.
    pub fn fail_times(&self, operation: Operation, error: RemoteError, times: u32) {
        self.state
            .lock()
            .failures
            .insert(operation, InjectedFailure { error, remaining: Some(times) });
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Delays every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Returns how many times `operation` has been called.
    #[must_use]
    pub fn calls(&self, operation: Operation) -> u64 {
        self.state.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Returns the number of calls across all operations.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.state.lock().calls.values().sum()
    }

    /// Resets all call counters.
    pub fn reset_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Records the call, applies latency and returns any injected failure.
    ///
    /// The lock is released before sleeping.
    async fn enter(&self, operation: Operation) -> RemoteResult<()> {
        let (latency, injected) = {
            let mut state = self.state.lock();
            *state.calls.entry(operation).or_default() += 1;
            let injected = match state.failures.get_mut(&operation) {
                Some(failure) => match failure.remaining.as_mut() {
                    None => Some(failure.error.clone()),
                    Some(0) => None,
                    Some(remaining) => {
                        *remaining -= 1;
                        Some(failure.error.clone())
                    },
                },
                None => None,
            };
            (state.latency, injected)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match injected {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for MemoryAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryAuthority")
            .field("cards", &state.cards.len())
            .field("revoked", &state.revoked.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthorityClient for MemoryAuthority {
    #[tracing::instrument(skip(self))]
    async fn get_card(&self, card_id: &str) -> RemoteResult<Card> {
        self.enter(Operation::Get).await?;
        let state = self.state.lock();
        if state.revoked.contains(card_id) {
            return Err(RemoteError::not_found(format!("card {card_id}")));
        }
        state
            .cards
            .get(card_id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("card {card_id}")))
    }

    #[tracing::instrument(skip(self))]
    async fn search_cards(&self, criteria: &Criteria) -> RemoteResult<Vec<Card>> {
        self.enter(Operation::Search).await?;
        let state = self.state.lock();
        let cards = state
            .cards
            .values()
            .filter(|card| !state.revoked.contains(&card.id))
            .filter(|card| {
                card.info().is_ok_and(|info| {
                    criteria.matches(&info.identity, Some(info.identity_type.as_str()), &info.scope)
                })
            })
            .cloned()
            .collect();
        Ok(cards)
    }

    #[tracing::instrument(skip(self, request))]
    async fn create_card(&self, request: &SignableRequest) -> RemoteResult<Card> {
        self.enter(Operation::Create).await?;
        if let Err(e) = CardInfo::from_snapshot(&request.snapshot) {
            return Err(RemoteError::service(
                400,
                ErrorCode::SNAPSHOT_INVALID,
                format!("snapshot does not decode: {e}"),
            ));
        }

        let card_id = cardgate_validation::card_id(&request.snapshot);
        let mut state = self.state.lock();
        if state.revoked.contains(&card_id) {
            return Err(RemoteError::service(403, ErrorCode::FORBIDDEN, "card was revoked"));
        }
        if let Some(existing) = state.cards.get(&card_id) {
            return Ok(existing.clone());
        }

        let card = Card {
            id: card_id.clone(),
            snapshot: request.snapshot.clone(),
            meta: CardMeta {
                created_at: Utc::now(),
                card_version: CARD_VERSION.to_owned(),
                signatures: request.signatures.clone(),
                relations: Default::default(),
            },
        };
        state.cards.insert(card_id, card.clone());
        Ok(card)
    }

    #[tracing::instrument(skip(self, _request))]
    async fn revoke_card(&self, card_id: &str, _request: &SignableRequest) -> RemoteResult<()> {
        self.enter(Operation::Revoke).await?;
        let mut state = self.state.lock();
        if !state.cards.contains_key(card_id) || state.revoked.contains(card_id) {
            return Err(RemoteError::not_found(format!("card {card_id}")));
        }
        state.revoked.insert(card_id.to_owned());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use cardgate_storage::{Scope, testutil::card_fixture};
    use cardgate_validation::testutil::TestKeypair;

    use super::*;

    #[tokio::test]
    async fn create_assigns_fingerprint_id() {
        let authority = MemoryAuthority::new();
        let request = TestKeypair::generate().create_request("alice", "username", Scope::Application);

        let card = authority.create_card(&request.request).await.unwrap();
        assert_eq!(card.id, cardgate_validation::card_id(&request.request.snapshot));
        assert_eq!(card.meta.signatures, request.request.signatures);
        assert_eq!(authority.get_card(&card.id).await.unwrap(), card);
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let authority = MemoryAuthority::new();
        let request = TestKeypair::generate().create_request("alice", "username", Scope::Application);

        let first = authority.create_card(&request.request).await.unwrap();
        let second = authority.create_card(&request.request).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn undecodable_snapshot_is_a_service_error() {
        let authority = MemoryAuthority::new();
        let err = authority.create_card(&SignableRequest::new(b"not json".to_vec())).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::SNAPSHOT_INVALID));
    }

    #[tokio::test]
    async fn revoked_cards_disappear() {
        let authority = MemoryAuthority::new();
        authority.insert(card_fixture("c1", "alice", "username", Scope::Application));

        authority.revoke_card("c1", &SignableRequest::default()).await.unwrap();
        assert!(authority.is_revoked("c1"));
        assert!(matches!(authority.get_card("c1").await, Err(RemoteError::NotFound { .. })));
        assert!(authority.search_cards(&Criteria::new(["alice"])).await.unwrap().is_empty());
        assert!(matches!(
            authority.revoke_card("c1", &SignableRequest::default()).await,
            Err(RemoteError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn search_filters_by_criteria() {
        let authority = MemoryAuthority::new();
        authority.insert(card_fixture("c1", "alice", "username", Scope::Application));
        authority.insert(card_fixture("c2", "alice", "email", Scope::Global));
        authority.insert(card_fixture("c3", "bob", "username", Scope::Application));

        let found = authority.search_cards(&Criteria::new(["alice", "bob"])).await.unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c1", "c3"]);

        let global = authority
            .search_cards(&Criteria::new(["alice"]).with_scope(Scope::Global))
            .await
            .unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].id, "c2");
    }

    #[tokio::test]
    async fn counted_failures_run_out() {
        let authority = MemoryAuthority::new();
        authority.insert(card_fixture("c1", "alice", "username", Scope::Application));
        authority.fail_times(Operation::Get, RemoteError::transport("reset"), 2);

        assert!(authority.get_card("c1").await.is_err());
        assert!(authority.get_card("c1").await.is_err());
        assert!(authority.get_card("c1").await.is_ok());
        assert_eq!(authority.calls(Operation::Get), 3);
        assert_eq!(authority.calls(Operation::Search), 0);
    }

    #[tokio::test]
    async fn persistent_failures_until_cleared() {
        let authority = MemoryAuthority::new();
        authority.fail(Operation::Search, RemoteError::service(500, ErrorCode(50000), "down"));

        for _ in 0..3 {
            assert!(authority.search_cards(&Criteria::new(["alice"])).await.is_err());
        }
        authority.clear_failures();
        assert!(authority.search_cards(&Criteria::new(["alice"])).await.is_ok());
        assert_eq!(authority.total_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_calls() {
        let authority = MemoryAuthority::new();
        authority.set_latency(Duration::from_millis(250));

        let start = tokio::time::Instant::now();
        let _ = authority.get_card("missing").await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
