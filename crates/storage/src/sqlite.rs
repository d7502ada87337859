//! SQLite-backed persisted card store.
//!
//! [`SqliteCardStore`] keeps every record in a single `cards` table:
//!
//! ```text
//! cards
//! ├── row_id         INTEGER PRIMARY KEY
//! ├── card_id        TEXT UNIQUE NULL      -- NULL for identity-keyed negatives
//! ├── identity       TEXT NOT NULL
//! ├── identity_type  TEXT NULL
//! ├── scope          TEXT NOT NULL
//! ├── expire_at      INTEGER NOT NULL      -- Unix seconds
//! ├── deleted        INTEGER NOT NULL
//! ├── error_code     INTEGER NOT NULL      -- 0 for positive rows
//! └── card           TEXT NULL             -- card JSON for positive rows
//! ```
//!
//! Search lookups use an index on `(identity, identity_type, scope)`.
//!
//! The connection sits behind a [`parking_lot::Mutex`]. Statements run on the
//! blocking thread pool via [`tokio::task::spawn_blocking`]; the lock is taken
//! and released inside that closure and is never held across an `.await`.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::debug;

use crate::{
    card::Card,
    error::{StorageError, StorageResult},
    record::{CachedRecord, RecordPayload},
    store::PersistedCardStore,
    types::{Criteria, ErrorCode, Scope},
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cards (
    row_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    card_id       TEXT UNIQUE,
    identity      TEXT NOT NULL,
    identity_type TEXT,
    scope         TEXT NOT NULL,
    expire_at     INTEGER NOT NULL,
    deleted       INTEGER NOT NULL DEFAULT 0,
    error_code    INTEGER NOT NULL DEFAULT 0,
    card          TEXT
);
CREATE INDEX IF NOT EXISTS idx_cards_identity ON cards (identity, identity_type, scope);
";

const COLUMNS: &str = "card_id, identity, identity_type, scope, expire_at, deleted, error_code, card";

/// [`PersistedCardStore`] backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteCardStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCardStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the file cannot be opened and
    /// [`StorageError::Internal`] if the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StorageError::connection_with_source(format!("failed to open {}", path.display()), e)
        })?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database or create the schema.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::connection_with_source("failed to open in-memory database", e))?;
        Self::with_connection(conn)
    }

    /// Wraps an existing connection, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the schema cannot be created.
    pub fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA).map_err(|e| sql_error("schema creation", e))?;
        debug!("sqlite card store ready");
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            card_id: row.get(0)?,
            identity: row.get(1)?,
            identity_type: row.get(2)?,
            scope: row.get(3)?,
            expire_at: row.get(4)?,
            deleted: row.get(5)?,
            error_code: row.get(6)?,
            card: row.get(7)?,
        })
    }

    /// Runs `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut *guard)
        })
            .await
            .map_err(|e| StorageError::internal_with_source(format!("sqlite {operation} task failed"), e))?
            .map_err(|e| sql_error(operation, e))
    }

    /// Builds the `WHERE` clause and bound parameters shared by `find` and
    /// `delete_by_search`.
    fn search_filter(criteria: &Criteria) -> (String, Vec<String>) {
        let placeholders = vec!["?"; criteria.identities.len()].join(", ");
        let mut clause = format!("identity IN ({placeholders}) AND scope = ?");
        let mut values = criteria.identities.clone();
        values.push(criteria.effective_scope().as_str().to_owned());
        if let Some(identity_type) = &criteria.identity_type {
            clause.push_str(" AND identity_type = ?");
            values.push(identity_type.clone());
        }
        (clause, values)
    }
}

/// Column values as stored, before decoding into a [`CachedRecord`].
struct RawRow {
    card_id: Option<String>,
    identity: String,
    identity_type: Option<String>,
    scope: String,
    expire_at: i64,
    deleted: bool,
    error_code: i64,
    card: Option<String>,
}

impl RawRow {
    fn decode(self) -> StorageResult<CachedRecord> {
        let payload = if self.error_code != 0 {
            let code = u32::try_from(self.error_code).map_err(|_| {
                StorageError::serialization(format!("error code {} out of range", self.error_code))
            })?;
            RecordPayload::Negative(ErrorCode(code))
        } else {
            let json = self.card.ok_or_else(|| {
                StorageError::serialization("row has neither a card nor an error code")
            })?;
            RecordPayload::Positive(serde_json::from_str::<Card>(&json)?)
        };
        let expire_at = DateTime::<Utc>::from_timestamp(self.expire_at, 0).ok_or_else(|| {
            StorageError::serialization(format!("expire_at {} out of range", self.expire_at))
        })?;

        Ok(CachedRecord {
            card_id: self.card_id,
            identity: self.identity,
            identity_type: self.identity_type,
            scope: Scope::from(self.scope),
            expire_at,
            deleted: self.deleted,
            payload,
        })
    }
}

fn sql_error(operation: &str, err: rusqlite::Error) -> StorageError {
    StorageError::internal_with_source(format!("sqlite {operation} failed"), err)
}

#[async_trait]
impl PersistedCardStore for SqliteCardStore {
    #[tracing::instrument(skip(self))]
    async fn get(&self, card_id: &str) -> StorageResult<Option<CachedRecord>> {
        let card_id = card_id.to_owned();
        let raw = self
            .with_conn("get", move |conn| {
                conn.query_row(
                    &format!("SELECT {COLUMNS} FROM cards WHERE card_id = ?1"),
                    params![card_id],
                    Self::read_row,
                )
                .optional()
            })
            .await?;
        raw.map(RawRow::decode).transpose()
    }

    #[tracing::instrument(skip(self, criteria), fields(identities = criteria.identities.len()))]
    async fn find(&self, criteria: &Criteria) -> StorageResult<Vec<CachedRecord>> {
        if criteria.identities.is_empty() {
            return Ok(Vec::new());
        }
        let (clause, values) = Self::search_filter(criteria);
        let raw = self
            .with_conn("find", move |conn| {
                let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM cards WHERE {clause} ORDER BY row_id"))?;
                let rows = stmt.query_map(params_from_iter(values.iter()), Self::read_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        raw.into_iter().map(RawRow::decode).collect()
    }

    #[tracing::instrument(skip(self, record), fields(card_id = ?record.card_id, identity = %record.identity))]
    async fn add(&self, record: CachedRecord) -> StorageResult<()> {
        let (error_code, card) = match &record.payload {
            RecordPayload::Positive(card) => (0_i64, Some(serde_json::to_string(card)?)),
            RecordPayload::Negative(code) => (i64::from(code.as_u32()), None),
        };
        let scope = record.scope.as_str().to_owned();
        let expire_at = record.expire_at.timestamp();

        self.with_conn("add", move |conn| {
            match &record.card_id {
                Some(card_id) => {
                    conn.execute(
                        "INSERT INTO cards (card_id, identity, identity_type, scope, expire_at, deleted, error_code, card)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                         ON CONFLICT (card_id) DO UPDATE SET
                             identity = excluded.identity,
                             identity_type = excluded.identity_type,
                             scope = excluded.scope,
                             expire_at = excluded.expire_at,
                             deleted = excluded.deleted,
                             error_code = excluded.error_code,
                             card = excluded.card",
                        params![
                            card_id,
                            record.identity,
                            record.identity_type,
                            scope,
                            expire_at,
                            record.deleted,
                            error_code,
                            card
                        ],
                    )?;
                },
                None => {
                    let tx = conn.transaction()?;
                    tx.execute(
                        "DELETE FROM cards
                         WHERE card_id IS NULL AND identity = ?1 AND identity_type IS ?2 AND scope = ?3",
                        params![record.identity, record.identity_type, scope],
                    )?;
                    tx.execute(
                        "INSERT INTO cards (card_id, identity, identity_type, scope, expire_at, deleted, error_code, card)
                         VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            record.identity,
                            record.identity_type,
                            scope,
                            expire_at,
                            record.deleted,
                            error_code,
                            card
                        ],
                    )?;
                    tx.commit()?;
                },
            }
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn mark_deleted(&self, card_id: &str) -> StorageResult<bool> {
        let card_id = card_id.to_owned();
        let changed = self
            .with_conn("mark_deleted", move |conn| {
                conn.execute("UPDATE cards SET deleted = 1 WHERE card_id = ?1", params![card_id])
            })
            .await?;
        Ok(changed > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_by_id(&self, card_id: &str) -> StorageResult<bool> {
        let card_id = card_id.to_owned();
        let changed = self
            .with_conn("delete_by_id", move |conn| {
                conn.execute("DELETE FROM cards WHERE card_id = ?1", params![card_id])
            })
            .await?;
        Ok(changed > 0)
    }

    #[tracing::instrument(skip(self, criteria), fields(identities = criteria.identities.len()))]
    async fn delete_by_search(&self, criteria: &Criteria) -> StorageResult<usize> {
        if criteria.identities.is_empty() {
            return Ok(0);
        }
        let (clause, values) = Self::search_filter(criteria);
        self.with_conn("delete_by_search", move |conn| {
            conn.execute(&format!("DELETE FROM cards WHERE {clause}"), params_from_iter(values.iter()))
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.db");

        {
            let store = SqliteCardStore::open(&path).unwrap();
            store
                .add(CachedRecord::negative_for_card(
                    "card-1",
                    ErrorCode::FORBIDDEN,
                    DateTime::UNIX_EPOCH,
                    Duration::from_secs(60),
                ))
                .await
                .unwrap();
        }

        let reopened = SqliteCardStore::open(&path).unwrap();
        let record = reopened.get("card-1").await.unwrap().unwrap();
        assert_eq!(record.error_code(), Some(ErrorCode::FORBIDDEN));
        assert_eq!(record.expire_at.timestamp(), 60);
    }

    #[tokio::test]
    async fn corrupt_rows_surface_as_serialization_errors() {
        let store = SqliteCardStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO cards (card_id, identity, scope, expire_at, error_code, card)
                 VALUES ('bad', 'alice', 'global', 0, 0, 'not json')",
                [],
            )
            .unwrap();

        crate::assert_serialization_error!(store.get("bad").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writers_share_the_connection() {
        let store = SqliteCardStore::open_in_memory().unwrap();
        let writers: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    let record = CachedRecord::negative_for_card(
                        format!("card-{n}"),
                        ErrorCode::ENTITY_NOT_FOUND,
                        DateTime::UNIX_EPOCH,
                        Duration::from_secs(60),
                    );
                    store.add(record).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        for n in 0..8 {
            assert!(store.get(&format!("card-{n}")).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn empty_identity_list_matches_nothing() {
        let store = SqliteCardStore::open_in_memory().unwrap();
        assert!(store.find(&Criteria::default()).await.unwrap().is_empty());
        assert_eq!(store.delete_by_search(&Criteria::default()).await.unwrap(), 0);
    }
}
