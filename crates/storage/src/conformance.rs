//! Conformance test suite for [`PersistedCardStore`] implementations.
//!
//! Every store, in-memory or SQLite, runs the same async checks so the cache
//! engine can rely on identical semantics regardless of the backend.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with a
//! fresh store instance:
//!
//! ```no_run
//! use cardgate_storage::{MemoryCardStore, conformance};
//!
//! #[tokio::test]
//! async fn get_missing_returns_none() {
//!     conformance::get_missing_returns_none(&MemoryCardStore::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | Point lookup | `get` / `add` / replace semantics |
//! | Search | `find` filters on identity, type and scope |
//! | Deletion | soft and hard deletes |
//! | Negative rows | identity-keyed negatives replace each other |

use std::{sync::Arc, time::Duration};

use crate::{
    record::{CachedRecord, RecordPayload},
    store::PersistedCardStore,
    testutil::{card_fixture, reference_time},
    types::{Criteria, ErrorCode, Scope},
};

const TTL: Duration = Duration::from_secs(3600);

fn positive(id: &str, identity: &str, identity_type: &str, scope: Scope) -> CachedRecord {
    CachedRecord::positive(card_fixture(id, identity, identity_type, scope), reference_time(), TTL)
        .expect("fixture card decodes")
}

// ============================================================================
// Point lookup
// ============================================================================

/// `get` of an unknown id returns `Ok(None)`.
pub async fn get_missing_returns_none<S: PersistedCardStore>(store: &S) {
    let result = store.get("nonexistent").await;
    assert!(result.is_ok(), "get should not error on missing id: {result:?}");
    assert_eq!(result.expect("checked above"), None);
}

/// `add` then `get` returns the same record.
pub async fn add_then_get_returns_record<S: PersistedCardStore>(store: &S) {
    let record = positive("card-1", "alice", "email", Scope::Global);
    store.add(record.clone()).await.expect("add");
    let fetched = store.get("card-1").await.expect("get").expect("record present");
    assert_eq!(fetched, record);
}

/// Adding a record with an existing card id replaces the old row.
pub async fn add_replaces_existing_card_id<S: PersistedCardStore>(store: &S) {
    store
        .add(CachedRecord::negative_for_card(
            "card-1",
            ErrorCode::ENTITY_NOT_FOUND,
            reference_time(),
            TTL,
        ))
        .await
        .expect("add negative");
    let record = positive("card-1", "alice", "email", Scope::Application);
    store.add(record.clone()).await.expect("add positive");

    let fetched = store.get("card-1").await.expect("get").expect("record present");
    assert_eq!(fetched, record);
    assert_eq!(store.find(&Criteria::new(["alice"])).await.expect("find").len(), 1);
}

/// Negative card records round-trip their error code and expiry.
pub async fn negative_card_record_round_trips<S: PersistedCardStore>(store: &S) {
    let record = CachedRecord::negative_for_card(
        "card-404",
        ErrorCode::ENTITY_NOT_FOUND,
        reference_time(),
        Duration::from_secs(30),
    );
    store.add(record.clone()).await.expect("add");
    let fetched = store.get("card-404").await.expect("get").expect("record present");
    assert_eq!(fetched.payload, RecordPayload::Negative(ErrorCode::ENTITY_NOT_FOUND));
    assert_eq!(fetched.expire_at, record.expire_at);
}

// ============================================================================
// Search
// ============================================================================

/// `find` returns only rows for the requested identities.
pub async fn find_filters_by_identity<S: PersistedCardStore>(store: &S) {
    store.add(positive("a", "alice", "email", Scope::Application)).await.expect("add");
    store.add(positive("b", "bob", "email", Scope::Application)).await.expect("add");
    store.add(positive("c", "carol", "email", Scope::Application)).await.expect("add");

    let mut ids: Vec<_> = store
        .find(&Criteria::new(["alice", "carol"]))
        .await
        .expect("find")
        .into_iter()
        .filter_map(|r| r.card_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a".to_owned(), "c".to_owned()]);
}

/// `find` honours the identity type filter and ignores it when absent.
pub async fn find_filters_by_identity_type<S: PersistedCardStore>(store: &S) {
    store.add(positive("a", "alice", "email", Scope::Application)).await.expect("add");
    store.add(positive("b", "alice", "phone", Scope::Application)).await.expect("add");

    let typed = store
        .find(&Criteria::new(["alice"]).with_identity_type("phone"))
        .await
        .expect("find typed");
    assert_eq!(typed.len(), 1);
    assert_eq!(typed[0].card_id.as_deref(), Some("b"));

    let untyped = store.find(&Criteria::new(["alice"])).await.expect("find untyped");
    assert_eq!(untyped.len(), 2);
}

/// `find` matches the effective scope, defaulting to application.
pub async fn find_filters_by_scope<S: PersistedCardStore>(store: &S) {
    store.add(positive("g", "alice", "email", Scope::Global)).await.expect("add");
    store.add(positive("p", "alice", "email", Scope::Application)).await.expect("add");

    let default_scope = store.find(&Criteria::new(["alice"])).await.expect("find");
    assert_eq!(default_scope.len(), 1);
    assert_eq!(default_scope[0].card_id.as_deref(), Some("p"));

    let global = store.find(&Criteria::new(["alice"]).with_scope(Scope::Global)).await.expect("find");
    assert_eq!(global.len(), 1);
    assert_eq!(global[0].card_id.as_deref(), Some("g"));
}

/// `find` includes soft-deleted and negative rows.
pub async fn find_includes_deleted_and_negative_rows<S: PersistedCardStore>(store: &S) {
    store.add(positive("a", "alice", "email", Scope::Application)).await.expect("add");
    store.mark_deleted("a").await.expect("mark");
    store
        .add(CachedRecord::negative_for_identity(
            "bob",
            None,
            Scope::Application,
            ErrorCode::ENTITY_NOT_FOUND,
            reference_time(),
            TTL,
        ))
        .await
        .expect("add negative");

    let rows = store.find(&Criteria::new(["alice", "bob"])).await.expect("find");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.deleted));
    assert!(rows.iter().any(|r| r.error_code() == Some(ErrorCode::ENTITY_NOT_FOUND)));
}

// ============================================================================
// Deletion
// ============================================================================

/// `mark_deleted` sets the flag and reports whether a row existed.
pub async fn mark_deleted_sets_flag<S: PersistedCardStore>(store: &S) {
    store.add(positive("a", "alice", "email", Scope::Application)).await.expect("add");

    assert!(store.mark_deleted("a").await.expect("mark"));
    assert!(!store.mark_deleted("ghost").await.expect("mark missing"));

    let fetched = store.get("a").await.expect("get").expect("record present");
    assert!(fetched.deleted);
    assert!(fetched.card().is_some(), "soft delete keeps the card");
}

/// `delete_by_id` removes the row and is idempotent.
pub async fn delete_by_id_removes_row<S: PersistedCardStore>(store: &S) {
    store.add(positive("a", "alice", "email", Scope::Application)).await.expect("add");

    assert!(store.delete_by_id("a").await.expect("delete"));
    assert!(!store.delete_by_id("a").await.expect("delete again"));
    assert_eq!(store.get("a").await.expect("get"), None);
}

/// `delete_by_search` removes exactly the rows `find` would return.
pub async fn delete_by_search_matches_find<S: PersistedCardStore>(store: &S) {
    store.add(positive("a", "alice", "email", Scope::Application)).await.expect("add");
    store.add(positive("b", "bob", "email", Scope::Application)).await.expect("add");
    store.add(positive("g", "alice", "email", Scope::Global)).await.expect("add");

    let removed = store.delete_by_search(&Criteria::new(["alice"])).await.expect("delete");
    assert_eq!(removed, 1);
    assert_eq!(store.get("a").await.expect("get"), None);
    assert!(store.get("b").await.expect("get").is_some());
    assert!(store.get("g").await.expect("get").is_some());
}

// ============================================================================
// Negative rows
// ============================================================================

/// A second identity-keyed negative for the same key replaces the first.
pub async fn identity_negative_replaces_previous<S: PersistedCardStore>(store: &S) {
    for code in [ErrorCode::ENTITY_NOT_FOUND, ErrorCode::FORBIDDEN] {
        store
            .add(CachedRecord::negative_for_identity(
                "alice",
                Some("email".to_owned()),
                Scope::Global,
                code,
                reference_time(),
                TTL,
            ))
            .await
            .expect("add negative");
    }

    let rows = store
        .find(&Criteria::new(["alice"]).with_identity_type("email").with_scope(Scope::Global))
        .await
        .expect("find");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].error_code(), Some(ErrorCode::FORBIDDEN));
    assert_eq!(rows[0].card_id, None);
}

/// Untyped negatives are distinct from typed ones for the same identity.
pub async fn untyped_negative_is_distinct<S: PersistedCardStore>(store: &S) {
    for identity_type in [None, Some("email".to_owned())] {
        store
            .add(CachedRecord::negative_for_identity(
                "alice",
                identity_type,
                Scope::Application,
                ErrorCode::ENTITY_NOT_FOUND,
                reference_time(),
                TTL,
            ))
            .await
            .expect("add negative");
    }

    assert_eq!(store.find(&Criteria::new(["alice"])).await.expect("find").len(), 2);
}

/// Concurrent adds of distinct cards all land.
pub async fn concurrent_adds_all_land<S: PersistedCardStore + 'static>(store: Arc<S>) {
    let mut handles = Vec::new();
    for idx in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let id = format!("card-{idx:02}");
            store.add(positive(&id, "alice", "email", Scope::Application)).await.expect("add");
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    assert_eq!(store.find(&Criteria::new(["alice"])).await.expect("find").len(), 16);
}

/// Run the full conformance suite, using `fresh` to build an empty store for
/// each check.
pub async fn run_all<S, F>(fresh: F)
where
    S: PersistedCardStore + 'static,
    F: Fn() -> S,
{
    get_missing_returns_none(&fresh()).await;
    add_then_get_returns_record(&fresh()).await;
    add_replaces_existing_card_id(&fresh()).await;
    negative_card_record_round_trips(&fresh()).await;

    find_filters_by_identity(&fresh()).await;
    find_filters_by_identity_type(&fresh()).await;
    find_filters_by_scope(&fresh()).await;
    find_includes_deleted_and_negative_rows(&fresh()).await;

    mark_deleted_sets_flag(&fresh()).await;
    delete_by_id_removes_row(&fresh()).await;
    delete_by_search_matches_find(&fresh()).await;

    identity_negative_replaces_previous(&fresh()).await;
    untyped_negative_is_distinct(&fresh()).await;
    concurrent_adds_all_land(Arc::new(fresh())).await;
}
