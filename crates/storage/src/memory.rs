//! In-memory persisted card store.
//!
//! This module provides [`MemoryCardStore`], an in-memory implementation of
//! [`PersistedCardStore`] suitable for testing and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Shared**: Clones share the same underlying rows
//!
//! # Example
//!
//! ```
//! use cardgate_storage::{MemoryCardStore, PersistedCardStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryCardStore::new();
//!     assert!(store.get("missing").await.unwrap().is_none());
//!     assert!(store.is_empty());
//! }
//! ```
//!
//! # Limitations
//!
//! - Rows are not persisted; everything is lost when the process exits
//! - `find` scans every row

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::StorageResult, record::CachedRecord, store::PersistedCardStore, types::Criteria,
};

/// Key a row is stored under. Mirrors the uniqueness rules of the SQL schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Card(String),
    Identity { identity: String, identity_type: Option<String>, scope: String },
}

impl RowKey {
    fn of(record: &CachedRecord) -> Self {
        match &record.card_id {
            Some(card_id) => Self::Card(card_id.clone()),
            None => Self::Identity {
                identity: record.identity.clone(),
                identity_type: record.identity_type.clone(),
                scope: record.scope.as_str().to_owned(),
            },
        }
    }
}

/// In-memory [`PersistedCardStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCardStore {
    rows: Arc<RwLock<HashMap<RowKey, CachedRecord>>>,
}

impl MemoryCardStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns `true` if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn matching(record: &CachedRecord, criteria: &Criteria) -> bool {
        criteria.matches(&record.identity, record.identity_type.as_deref(), &record.scope)
    }
}

#[async_trait]
impl PersistedCardStore for MemoryCardStore {
    async fn get(&self, card_id: &str) -> StorageResult<Option<CachedRecord>> {
        Ok(self.rows.read().get(&RowKey::Card(card_id.to_owned())).cloned())
    }

    async fn find(&self, criteria: &Criteria) -> StorageResult<Vec<CachedRecord>> {
        let rows = self.rows.read();
        Ok(rows.values().filter(|record| Self::matching(record, criteria)).cloned().collect())
    }

    async fn add(&self, record: CachedRecord) -> StorageResult<()> {
        self.rows.write().insert(RowKey::of(&record), record);
        Ok(())
    }

    async fn mark_deleted(&self, card_id: &str) -> StorageResult<bool> {
        let mut rows = self.rows.write();
        match rows.get_mut(&RowKey::Card(card_id.to_owned())) {
            Some(record) => {
                record.deleted = true;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, card_id: &str) -> StorageResult<bool> {
        Ok(self.rows.write().remove(&RowKey::Card(card_id.to_owned())).is_some())
    }

    async fn delete_by_search(&self, criteria: &Criteria) -> StorageResult<usize> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|_, record| !Self::matching(record, criteria));
        Ok(before - rows.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use chrono::DateTime;

    use super::*;
    use crate::types::{ErrorCode, Scope};

    #[tokio::test]
    async fn clones_share_rows() {
        let store = MemoryCardStore::new();
        let clone = store.clone();

        clone
            .add(CachedRecord::negative_for_card(
                "card-1",
                ErrorCode::ENTITY_NOT_FOUND,
                DateTime::UNIX_EPOCH,
                Duration::from_secs(60),
            ))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.get("card-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn identity_rows_are_keyed_by_type_and_scope() {
        let store = MemoryCardStore::new();
        for (identity_type, scope) in [
            (None, Scope::Application),
            (Some("email".to_owned()), Scope::Application),
            (Some("email".to_owned()), Scope::Global),
            (Some("email".to_owned()), Scope::Global),
        ] {
            store
                .add(CachedRecord::negative_for_identity(
                    "alice",
                    identity_type,
                    scope,
                    ErrorCode::ENTITY_NOT_FOUND,
                    DateTime::UNIX_EPOCH,
                    Duration::from_secs(60),
                ))
                .await
                .unwrap();
        }

        assert_eq!(store.len(), 3);
    }
}
