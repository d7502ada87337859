//! Integration test verifying that `#[instrument]` annotations produce
//! the expected span names as a request travels through each layer.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use cardgate::{CardService, Mode, testutil::GatewayHarness};
use cardgate_storage::{Criteria, Scope, testutil::card_fixture};
use cardgate_validation::testutil::TestKeypair;
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer: records span names as they are created
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

fn collect_spans() -> (Arc<Mutex<Vec<String>>>, tracing::subscriber::DefaultGuard) {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));
    (spans, guard)
}

fn assert_spans(recorded: &[String], expected: &[&str]) {
    for name in expected {
        assert!(recorded.iter().any(|s| s == name), "expected a '{name}' span, got: {recorded:?}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cache_mode_get_crosses_every_layer() {
    let (spans, _guard) = collect_spans();

    let h = GatewayHarness::new(Mode::Cache);
    h.authority.insert(card_fixture("c1", "alice", "username", Scope::Application));
    h.gateway.get(&h.ctx(), "c1").await.expect("get should succeed");

    assert_spans(&spans.lock().expect("lock poisoned"), &["front_get", "persisted_get", "remote_get"]);
}

#[tokio::test]
async fn sync_mode_search_creates_spans() {
    let (spans, _guard) = collect_spans();

    let h = GatewayHarness::new(Mode::Sync);
    let _ = h.gateway.search(&h.ctx(), &Criteria::new(["alice"])).await;

    assert_spans(
        &spans.lock().expect("lock poisoned"),
        &["guard_search", "front_search", "persisted_search", "remote_search"],
    );
}

#[tokio::test]
async fn default_mode_mutations_create_spans() {
    let (spans, _guard) = collect_spans();

    let h = GatewayHarness::new(Mode::Default);
    let owner = TestKeypair::generate();
    let card = h
        .gateway
        .create(&h.ctx(), &owner.create_request("alice", "username", Scope::Application))
        .await
        .expect("create should succeed");
    h.gateway
        .revoke(&h.ctx(), &owner.revoke_request(&card.id, "retired"))
        .await
        .expect("revoke should succeed");

    assert_spans(
        &spans.lock().expect("lock poisoned"),
        &["guard_create", "front_create", "local_create", "guard_revoke", "front_revoke", "local_revoke"],
    );
}

#[tokio::test]
async fn proxy_mode_create_reaches_remote_span() {
    let (spans, _guard) = collect_spans();

    let h = GatewayHarness::new(Mode::Proxy);
    let owner = TestKeypair::generate();
    let _ = h.gateway.create(&h.ctx(), &owner.create_request("alice", "username", Scope::Application)).await;

    assert_spans(&spans.lock().expect("lock poisoned"), &["guard_create", "front_create", "remote_create"]);
}
