//! End-to-end behaviour of composed gateways: negative caching, expiry,
//! soft deletes, front cache completeness and validation ordering.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use cardgate::{
    CardService, GatewayConfig, GatewayError, Mode, assert_gateway_code, assert_gateway_error,
    testutil::GatewayHarness,
};
use cardgate_remote::{Operation, RemoteError};
use cardgate_storage::{
    Criteria, ErrorCode, PERMANENT_EXPIRY_SECS, PersistedCardStore, Scope,
    testutil::{REFERENCE_TIMESTAMP, card_fixture},
};
use cardgate_validation::testutil::TestKeypair;
use rstest::rstest;

const CACHE_DURATION: Duration = Duration::from_secs(3600);

fn config(mode: Mode, front_cache: bool) -> GatewayConfig {
    let mut config = GatewayConfig::builder().mode(mode).cache_duration(CACHE_DURATION).build();
    config.front_cache.enabled = front_cache;
    config
}

// ---------------------------------------------------------------------------
// Negative caching
// ---------------------------------------------------------------------------

#[rstest]
#[case(Mode::Cache)]
#[case(Mode::Sync)]
#[tokio::test]
async fn service_error_is_memoized_per_card(#[case] mode: Mode) {
    let h = GatewayHarness::with_config(config(mode, true));
    h.authority.fail(Operation::Get, RemoteError::service(500, ErrorCode(50001), "backend exploded"));

    for _ in 0..3 {
        assert_gateway_code!(h.gateway.get(&h.ctx(), "bad-id").await, ErrorCode(50001));
    }
    assert_eq!(h.authority.calls(Operation::Get), 1);
}

#[tokio::test]
async fn not_found_is_memoized_for_every_tenant() {
    let h = GatewayHarness::with_config(config(Mode::Cache, true));

    assert_gateway_error!(
        h.gateway.get(&cardgate::CallContext::new("t1"), "X").await,
        GatewayError::NotFound { .. }
    );
    assert_gateway_error!(
        h.gateway.get(&cardgate::CallContext::new("t2"), "X").await,
        GatewayError::NotFound { .. }
    );
    assert_eq!(h.authority.calls(Operation::Get), 1);
}

#[tokio::test]
async fn failed_search_memoizes_each_identity() {
    let h = GatewayHarness::with_config(config(Mode::Cache, false));
    h.authority.fail(Operation::Search, RemoteError::service(502, ErrorCode(50002), "upstream"));
    let criteria = Criteria::new(["carol", "dave"]);

    assert_gateway_code!(h.gateway.search(&h.ctx(), &criteria).await, ErrorCode(50002));
    assert_eq!(h.store.len(), 2);

    // Each identity on its own now short-circuits too.
    assert_gateway_code!(h.gateway.search(&h.ctx(), &Criteria::new(["dave"])).await, ErrorCode(50002));
    assert_eq!(h.authority.calls(Operation::Search), 1);
}

#[tokio::test]
async fn transport_errors_are_never_memoized() {
    let h = GatewayHarness::with_config(config(Mode::Cache, false));
    h.authority.fail(Operation::Get, RemoteError::transport("connection reset"));

    assert_gateway_error!(h.gateway.get(&h.ctx(), "c1").await, GatewayError::Transport { .. });
    assert!(h.store.is_empty());

    h.authority.clear_failures();
    h.authority.insert(card_fixture("c1", "alice", "username", Scope::Application));
    assert_eq!(h.gateway.get(&h.ctx(), "c1").await.unwrap().id, "c1");
}

// ---------------------------------------------------------------------------
// Get("X") scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_populates_a_positive_record() {
    let h = GatewayHarness::with_config(config(Mode::Cache, true));
    let remote_card = card_fixture("X", "alice", "username", Scope::Application);
    h.authority.insert(remote_card.clone());

    let card = h.gateway.get(&h.ctx(), "X").await.unwrap();

    assert_eq!(card, remote_card);
    assert_eq!(h.store.len(), 1);
    let record = h.store.get("X").await.unwrap().expect("record persisted");
    assert_eq!(record.card_id.as_deref(), Some("X"));
    assert_eq!(record.error_code(), None);
}

#[tokio::test]
async fn remote_not_found_populates_a_negative_record() {
    let h = GatewayHarness::with_config(config(Mode::Cache, true));

    let result = h.gateway.get(&h.ctx(), "X").await;

    assert_gateway_code!(result, ErrorCode::ENTITY_NOT_FOUND);
    let record = h.store.get("X").await.unwrap().expect("record persisted");
    assert_eq!(record.card_id.as_deref(), Some("X"));
    assert_eq!(record.error_code(), Some(ErrorCode::ENTITY_NOT_FOUND));
}

#[tokio::test]
async fn remote_404_is_memoized_as_canonical_not_found() {
    let h = GatewayHarness::with_config(config(Mode::Cache, true));
    h.authority.fail(Operation::Get, RemoteError::service(404, ErrorCode(40400), "card X"));

    assert_gateway_error!(h.gateway.get(&h.ctx(), "X").await, GatewayError::NotFound { .. });
    let record = h.store.get("X").await.unwrap().expect("record persisted");
    assert_eq!(record.error_code(), Some(ErrorCode::ENTITY_NOT_FOUND));

    assert_gateway_code!(h.gateway.get(&h.ctx(), "X").await, ErrorCode::ENTITY_NOT_FOUND);
    assert_eq!(h.authority.calls(Operation::Get), 1);
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn record_expiring_exactly_now_is_refreshed() {
    let h = GatewayHarness::with_config(config(Mode::Cache, false));
    h.authority.insert(card_fixture("g1", "alice@example.com", "email", Scope::Global));

    h.gateway.get(&h.ctx(), "g1").await.unwrap();
    let record = h.store.get("g1").await.unwrap().unwrap();
    assert_eq!(record.expire_at.timestamp(), REFERENCE_TIMESTAMP + 3600);

    h.clock.advance(CACHE_DURATION - Duration::from_secs(1));
    h.gateway.get(&h.ctx(), "g1").await.unwrap();
    assert_eq!(h.authority.calls(Operation::Get), 1, "one second before expiry is still fresh");

    h.clock.advance(Duration::from_secs(1));
    h.gateway.get(&h.ctx(), "g1").await.unwrap();
    assert_eq!(h.authority.calls(Operation::Get), 2, "expire_at == now is expired");
}

#[tokio::test]
async fn expired_search_set_is_refetched_as_a_whole() {
    let h = GatewayHarness::with_config(config(Mode::Cache, false));
    h.authority.insert(card_fixture("g1", "alice@example.com", "email", Scope::Global));
    h.authority.insert(card_fixture("g2", "bob@example.com", "email", Scope::Global));
    let criteria = Criteria::new(["alice@example.com", "bob@example.com"]).with_scope(Scope::Global);

    assert_eq!(h.gateway.search(&h.ctx(), &criteria).await.unwrap().len(), 2);
    assert_eq!(h.gateway.search(&h.ctx(), &criteria).await.unwrap().len(), 2);
    assert_eq!(h.authority.calls(Operation::Search), 1);

    h.clock.advance(CACHE_DURATION);
    assert_eq!(h.gateway.search(&h.ctx(), &criteria).await.unwrap().len(), 2);
    assert_eq!(h.authority.calls(Operation::Search), 2);
}

#[rstest]
#[case(Scope::Application, "username", PERMANENT_EXPIRY_SECS)]
#[case(Scope::Global, "email", REFERENCE_TIMESTAMP + 3600)]
#[tokio::test]
async fn created_record_expiry_depends_on_scope(
    #[case] scope: Scope,
    #[case] identity_type: &str,
    #[case] expected_expiry: i64,
) {
    let h = GatewayHarness::with_config(config(Mode::Sync, true));
    let request = TestKeypair::generate().create_request("alice@example.com", identity_type, scope);

    let card = h.gateway.create(&h.ctx(), &request).await.unwrap();

    let record = h.store.get(&card.id).await.unwrap().expect("record persisted");
    assert_eq!(record.expire_at.timestamp(), expected_expiry);
    assert_eq!(record.card(), Some(&card));
}

// ---------------------------------------------------------------------------
// Soft delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn revoked_card_is_not_found_without_remote_calls() {
    let h = GatewayHarness::with_config(config(Mode::Sync, true));
    let owner = TestKeypair::generate();
    let card = h
        .gateway
        .create(&h.ctx(), &owner.create_request("alice", "username", Scope::Application))
        .await
        .unwrap();
    h.gateway.revoke(&h.ctx(), &owner.revoke_request(&card.id, "key compromised")).await.unwrap();
    h.authority.reset_calls();

    for _ in 0..2 {
        assert_gateway_error!(h.gateway.get(&h.ctx(), &card.id).await, GatewayError::NotFound { .. });
    }
    assert_eq!(h.authority.total_calls(), 0);
    assert!(h.store.get(&card.id).await.unwrap().unwrap().deleted);
}

#[tokio::test]
async fn revoked_card_is_dropped_from_searches() {
    let h = GatewayHarness::with_config(config(Mode::Sync, true));
    let alice = TestKeypair::generate();
    let kept = h
        .gateway
        .create(&h.ctx(), &alice.create_request("alice", "username", Scope::Application))
        .await
        .unwrap();
    let revoked = h
        .gateway
        .create(&h.ctx(), &alice.create_request("alice", "phone", Scope::Application))
        .await
        .unwrap();
    let criteria = Criteria::new(["alice"]);

    assert_eq!(h.gateway.search(&h.ctx(), &criteria).await.unwrap().len(), 2);
    h.gateway.revoke(&h.ctx(), &alice.revoke_request(&revoked.id, "lost phone")).await.unwrap();

    // The cached id list still names the revoked card, whose own entry is
    // gone, so the whole search falls through to the persisted tier.
    let misses_before = h.gateway.front_cache_stats().unwrap().misses;
    let cards = h.gateway.search(&h.ctx(), &criteria).await.unwrap();
    assert_eq!(cards, vec![kept]);
    assert_eq!(h.gateway.front_cache_stats().unwrap().misses, misses_before + 1);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[rstest]
#[case(Mode::Default)]
#[case(Mode::Sync)]
#[tokio::test]
async fn first_failing_rule_wins_and_backend_is_untouched(#[case] mode: Mode) {
    let h = GatewayHarness::with_config(config(mode, true));
    let owner = TestKeypair::generate();
    let mut info = owner.card_info("", "username", Scope::Application);
    info.public_key = vec![0x11; 4096];
    let request = owner.sign_create(info);

    assert_gateway_code!(h.gateway.create(&h.ctx(), &request).await, ErrorCode::IDENTITY_INVALID);
    assert_eq!(h.authority.total_calls(), 0);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn invalid_search_never_reaches_the_store() {
    let h = GatewayHarness::with_config(config(Mode::Cache, true));

    assert_gateway_code!(
        h.gateway.search(&h.ctx(), &Criteria::new(Vec::<String>::new())).await,
        ErrorCode::IDENTITIES_MISSING
    );
    assert_gateway_code!(
        h.gateway
            .search(&h.ctx(), &Criteria::new(["alice"]).with_scope(Scope::Unrecognized("galaxy".into())))
            .await,
        ErrorCode::SCOPE_INVALID
    );
    assert_eq!(h.authority.total_calls(), 0);
}
