//! Shared test utilities for card store and cache testing.
//!
//! This module provides card fixtures, a fixed reference time and assertion
//! macros on [`StorageResult`](crate::StorageResult) values. It is feature-gated behind `testutil`
//! to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! cardgate-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use cardgate_storage::testutil::{card_fixture, reference_time};
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{
    card::{CARD_VERSION, Card, CardInfo, CardMeta, Signatures},
    types::Scope,
};

/// Unix timestamp all fixtures are anchored to (2023-11-14T22:13:20Z).
pub const REFERENCE_TIMESTAMP: i64 = 1_700_000_000;

/// Returns the fixed reference time used by fixtures.
#[must_use]
pub fn reference_time() -> DateTime<Utc> {
    DateTime::from_timestamp(REFERENCE_TIMESTAMP, 0).expect("reference timestamp is in range")
}

/// Builds the structured fields of a test card.
#[must_use]
pub fn card_info(identity: &str, identity_type: &str, scope: Scope) -> CardInfo {
    CardInfo {
        identity: identity.to_owned(),
        identity_type: identity_type.to_owned(),
        public_key: vec![0x42; 32],
        scope,
        data: BTreeMap::new(),
        info: None,
    }
}

/// Builds a card with the given id whose snapshot encodes the given fields.
///
/// The card carries a single placeholder signature keyed by its own id.
#[must_use]
pub fn card_fixture(id: &str, identity: &str, identity_type: &str, scope: Scope) -> Card {
    let snapshot = card_info(identity, identity_type, scope)
        .to_snapshot()
        .expect("fixture card info encodes");
    Card {
        id: id.to_owned(),
        snapshot,
        meta: CardMeta {
            created_at: reference_time(),
            card_version: CARD_VERSION.to_owned(),
            signatures: Signatures::from([(id.to_owned(), vec![0xAB; 64])]),
            relations: Signatures::new(),
        },
    }
}

/// Assert that a [`StorageResult`](crate::StorageResult) is `Ok`.
///
/// Returns the inner value on success, panics with a descriptive message
/// on failure.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use cardgate_storage::assert_storage_ok;
/// use cardgate_storage::error::StorageResult;
///
/// let result: StorageResult<i32> = Ok(42);
/// let value = assert_storage_ok!(result);
/// assert_eq!(value, 42);
/// ```
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

/// Assert that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::Serialization`](crate::StorageError::Serialization).
#[macro_export]
macro_rules! assert_serialization_error {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Serialization { .. })),
            "expected StorageError::Serialization, got: {:?}",
            $result,
        );
    };
}
