//! Persistent activity cache
//!
//! Storage sits behind the `ActivityStore` capability trait so the sync
//! engine never sees SQL. The shipped implementation is SQLite: one row per
//! `(owner, tx_hash, timestamp)` with the full JSON payload, upserted with
//! `ON CONFLICT ... DO UPDATE`.

use crate::sync::error::StoreError;
use crate::sync::types::{ActivityRecord, SortDirection};
use async_trait::async_trait;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Aggregate cache statistics, per-owner or global
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_count: u64,
    /// Distinct owners; only present for global stats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_count: Option<u64>,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
    /// Wall clock of the most recent upsert (unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
}

/// Keyed, queryable store of cached activity records
///
/// All operations canonicalize the owner to lowercase before touching
/// storage.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Insert-or-replace a batch; per-record failures are logged and
    /// skipped. Returns the count actually written.
    async fn upsert(&self, owner: &str, records: &[ActivityRecord]) -> Result<usize, StoreError>;

    /// Paginated read ordered by timestamp. `limit` of `None` means all.
    async fn query_range(
        &self,
        owner: &str,
        limit: Option<u32>,
        offset: u32,
        direction: SortDirection,
    ) -> Result<Vec<ActivityRecord>, StoreError>;

    /// All cached records for the owner, ordered by timestamp
    async fn query_all(
        &self,
        owner: &str,
        direction: SortDirection,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        self.query_range(owner, None, 0, direction).await
    }

    /// Delete all entries for the owner; returns the count removed
    async fn clear(&self, owner: &str) -> Result<usize, StoreError>;

    /// Per-owner stats, or a global aggregate when `owner` is `None`
    async fn stats(&self, owner: Option<&str>) -> Result<CacheStats, StoreError>;

    /// Delete entries across all owners with `timestamp < cutoff`
    async fn evict_older_than(&self, cutoff: i64) -> Result<usize, StoreError>;
}

/// SQLite-backed implementation of `ActivityStore`
pub struct SqliteActivityStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteActivityStore {
    /// Open (or create) the database file and initialize the schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                owner           TEXT NOT NULL,
                tx_hash         TEXT NOT NULL,
                timestamp       INTEGER NOT NULL,
                condition_id    TEXT,
                payload         TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL,
                UNIQUE(owner, tx_hash, timestamp)
            );

            CREATE INDEX IF NOT EXISTS idx_owner_timestamp
                ON activities(owner, timestamp DESC);

            CREATE INDEX IF NOT EXISTS idx_owner_condition
                ON activities(owner, condition_id);
            "#,
        )?;
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for SqliteActivityStore {
    async fn upsert(&self, owner: &str, records: &[ActivityRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let owner = owner.to_lowercase();
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();

        let mut written = 0;
        for record in records {
            let payload = match serde_json::to_string(&record.payload) {
                Ok(json) => json,
                Err(e) => {
                    log::warn!("Skipping record {}: unserializable payload: {}", record.tx_hash, e);
                    continue;
                }
            };

            let result = conn.execute(
                r#"
                INSERT INTO activities
                    (owner, tx_hash, timestamp, condition_id, payload, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                ON CONFLICT(owner, tx_hash, timestamp) DO UPDATE SET
                    condition_id = excluded.condition_id,
                    payload = excluded.payload,
                    updated_at = excluded.updated_at
                "#,
                rusqlite::params![
                    owner,
                    record.tx_hash,
                    record.timestamp,
                    record.condition_id,
                    payload,
                    now,
                ],
            );

            match result {
                Ok(_) => written += 1,
                Err(e) => {
                    log::warn!("Failed to store record {}: {}", record.tx_hash, e);
                }
            }
        }

        Ok(written)
    }

    async fn query_range(
        &self,
        owner: &str,
        limit: Option<u32>,
        offset: u32,
        direction: SortDirection,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let owner = owner.to_lowercase();
        let conn = self.conn.lock().unwrap();

        // SQLite treats LIMIT -1 as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let sql = format!(
            "SELECT payload FROM activities WHERE owner = ?1 \
             ORDER BY timestamp {} LIMIT ?2 OFFSET ?3",
            direction.as_str()
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params![owner, limit, offset as i64],
            |row| row.get::<_, String>(0),
        )?;

        let mut records = Vec::new();
        for row in rows {
            let json = row?;
            match serde_json::from_str::<serde_json::Value>(&json) {
                Ok(value) => records.push(ActivityRecord::from_value(&value)),
                Err(e) => {
                    // Keep serving the rest of the range
                    log::warn!("Skipping corrupt cached row for {}: {}", owner, e);
                }
            }
        }

        Ok(records)
    }

    async fn clear(&self, owner: &str) -> Result<usize, StoreError> {
        let owner = owner.to_lowercase();
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM activities WHERE owner = ?1", [&owner])?;
        log::info!("Cleared {} cached records for {}", removed, owner);
        Ok(removed)
    }

    async fn stats(&self, owner: Option<&str>) -> Result<CacheStats, StoreError> {
        let conn = self.conn.lock().unwrap();

        let stats = match owner {
            Some(owner) => {
                let owner = owner.to_lowercase();
                conn.query_row(
                    "SELECT COUNT(*), MIN(timestamp), MAX(timestamp), MAX(updated_at) \
                     FROM activities WHERE owner = ?1",
                    [&owner],
                    |row| {
                        Ok(CacheStats {
                            total_count: row.get::<_, i64>(0)? as u64,
                            owner_count: None,
                            oldest_timestamp: row.get(1)?,
                            newest_timestamp: row.get(2)?,
                            last_updated: row.get(3)?,
                        })
                    },
                )?
            }
            None => conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT owner), MIN(timestamp), MAX(timestamp) \
                 FROM activities",
                [],
                |row| {
                    Ok(CacheStats {
                        total_count: row.get::<_, i64>(0)? as u64,
                        owner_count: Some(row.get::<_, i64>(1)? as u64),
                        oldest_timestamp: row.get(2)?,
                        newest_timestamp: row.get(3)?,
                        last_updated: None,
                    })
                },
            )?,
        };

        Ok(stats)
    }

    async fn evict_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM activities WHERE timestamp < ?1",
            [cutoff],
        )?;
        Ok(removed)
    }
}
