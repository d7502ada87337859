//! Persisted cache records.
//!
//! A [`CachedRecord`] is either a positive entry holding a full [`Card`] or a
//! negative entry memoizing an [`ErrorCode`]. Negative entries keyed by
//! identity (rather than by card id) remember failed searches.
//!
//! # Expiry
//!
//! | Record kind                  | `expire_at`             |
//! |------------------------------|-------------------------|
//! | Positive, global scope       | `now + cache_duration`  |
//! | Positive, application scope  | [`permanent_expiry`]    |
//! | Negative (any scope)         | `now + cache_duration`  |
//! | Authoritative (local issue)  | [`permanent_expiry`]    |
//!
//! Expiry is stored with whole-second precision and a record is expired once
//! `expire_at <= now`.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    card::Card,
    error::{StorageError, StorageResult},
    types::{ErrorCode, Scope},
};

/// Unix timestamp of 9999-12-31T23:59:59Z, used for records that never expire.
pub const PERMANENT_EXPIRY_SECS: i64 = 253_402_300_799;

/// Returns the far-future expiry assigned to permanent records.
#[must_use]
pub fn permanent_expiry() -> DateTime<Utc> {
    DateTime::from_timestamp(PERMANENT_EXPIRY_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// What a record remembers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordPayload {
    /// A successfully fetched card.
    Positive(Card),
    /// A memoized authority failure.
    Negative(ErrorCode),
}

/// One row of the persisted card store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRecord {
    /// Card id; `None` for identity-keyed negative records.
    pub card_id: Option<String>,
    /// Identity the record is indexed under.
    pub identity: String,
    /// Identity type the record is indexed under.
    pub identity_type: Option<String>,
    /// Scope the record is indexed under.
    pub scope: Scope,
    /// When the record stops being trusted.
    pub expire_at: DateTime<Utc>,
    /// Set once the card has been revoked through this gateway.
    pub deleted: bool,
    /// Card or memoized failure.
    pub payload: RecordPayload,
}

impl CachedRecord {
    /// Builds a positive record for a card fetched from the authority.
    ///
    /// Global cards expire after `ttl`; application cards never expire.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the card snapshot cannot be
    /// decoded into its indexed fields.
    pub fn positive(card: Card, now: DateTime<Utc>, ttl: Duration) -> StorageResult<Self> {
        let info = card.info().map_err(|e| {
            StorageError::serialization_with_source(format!("card {} has an invalid snapshot", card.id), e)
        })?;
        let expire_at = match info.scope {
            Scope::Global => expire_after(now, ttl),
            _ => permanent_expiry(),
        };
        Ok(Self {
            card_id: Some(card.id.clone()),
            identity: info.identity,
            identity_type: Some(info.identity_type),
            scope: info.scope,
            expire_at,
            deleted: false,
            payload: RecordPayload::Positive(card),
        })
    }

    /// Builds a permanent positive record for a card this gateway issued itself.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the card snapshot cannot be
    /// decoded into its indexed fields.
    pub fn authoritative(card: Card) -> StorageResult<Self> {
        let mut record = Self::positive(card, permanent_expiry(), Duration::ZERO)?;
        record.expire_at = permanent_expiry();
        Ok(record)
    }

    /// Builds a negative record memoizing a failed lookup of `card_id`.
    #[must_use]
    pub fn negative_for_card(
        card_id: impl Into<String>,
        code: ErrorCode,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            card_id: Some(card_id.into()),
            identity: String::new(),
            identity_type: None,
            scope: Scope::Global,
            expire_at: expire_after(now, ttl),
            deleted: false,
            payload: RecordPayload::Negative(code),
        }
    }

    /// Builds a negative record memoizing a failed search for `identity`.
    #[must_use]
    pub fn negative_for_identity(
        identity: impl Into<String>,
        identity_type: Option<String>,
        scope: Scope,
        code: ErrorCode,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            card_id: None,
            identity: identity.into(),
            identity_type,
            scope,
            expire_at: expire_after(now, ttl),
            deleted: false,
            payload: RecordPayload::Negative(code),
        }
    }

    /// Returns `true` once `now` has reached `expire_at`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now
    }

    /// Returns the card of a positive record.
    #[must_use]
    pub fn card(&self) -> Option<&Card> {
        match &self.payload {
            RecordPayload::Positive(card) => Some(card),
            RecordPayload::Negative(_) => None,
        }
    }

    /// Returns the memoized code of a negative record.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self.payload {
            RecordPayload::Negative(code) => Some(code),
            RecordPayload::Positive(_) => None,
        }
    }
}

/// Computes `now + ttl`, truncated to whole seconds.
#[must_use]
pub fn expire_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let expiry = TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or_else(permanent_expiry);
    DateTime::from_timestamp(expiry.timestamp(), 0).unwrap_or(expiry)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::card::{CARD_VERSION, CardInfo, CardMeta, Signatures};

    fn card(scope: Scope) -> Card {
        let info = CardInfo {
            identity: "alice".to_owned(),
            identity_type: "email".to_owned(),
            public_key: vec![1; 32],
            scope,
            data: BTreeMap::new(),
            info: None,
        };
        Card {
            id: "card-1".to_owned(),
            snapshot: info.to_snapshot().unwrap(),
            meta: CardMeta {
                created_at: DateTime::UNIX_EPOCH,
                card_version: CARD_VERSION.to_owned(),
                signatures: Signatures::new(),
                relations: Signatures::new(),
            },
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn global_positive_records_expire() {
        let record = CachedRecord::positive(card(Scope::Global), now(), Duration::from_secs(60)).unwrap();
        assert_eq!(record.expire_at.timestamp(), 1_700_000_060);
        assert_eq!(record.identity, "alice");
        assert_eq!(record.identity_type.as_deref(), Some("email"));
    }

    #[test]
    fn application_positive_records_are_permanent() {
        let record =
            CachedRecord::positive(card(Scope::Application), now(), Duration::from_secs(60)).unwrap();
        assert_eq!(record.expire_at, permanent_expiry());
    }

    #[test]
    fn negative_records_always_expire() {
        let record = CachedRecord::negative_for_identity(
            "alice",
            None,
            Scope::Application,
            ErrorCode::ENTITY_NOT_FOUND,
            now(),
            Duration::from_secs(60),
        );
        assert_eq!(record.expire_at.timestamp(), 1_700_000_060);
        assert_eq!(record.card_id, None);
        assert_eq!(record.error_code(), Some(ErrorCode::ENTITY_NOT_FOUND));
    }

    #[test]
    fn authoritative_records_never_expire_even_when_global() {
        let record = CachedRecord::authoritative(card(Scope::Global)).unwrap();
        assert_eq!(record.expire_at, permanent_expiry());
    }

    #[test]
    fn expiry_is_inclusive_of_the_boundary() {
        let record = CachedRecord::negative_for_card(
            "card-1",
            ErrorCode::ENTITY_NOT_FOUND,
            now(),
            Duration::from_secs(10),
        );
        assert!(!record.is_expired(now() + TimeDelta::seconds(9)));
        assert!(record.is_expired(now() + TimeDelta::seconds(10)));
    }

    #[test]
    fn invalid_snapshot_is_a_serialization_error() {
        let mut bad = card(Scope::Global);
        bad.snapshot = b"not json".to_vec();
        let err = CachedRecord::positive(bad, now(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[test]
    fn sub_second_expiry_is_truncated() {
        let start = now() + TimeDelta::milliseconds(700);
        let expiry = expire_after(start, Duration::from_millis(500));
        assert_eq!(expiry.timestamp(), 1_700_000_001);
        assert_eq!(expiry.timestamp_subsec_nanos(), 0);
    }
}
