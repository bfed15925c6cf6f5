//! `SQLite`-backed ranking store.

use super::connection::{
    acquire_lock, in_transaction, open_connection, record_operation_metrics, storage_error,
};
use super::row::{from_millis, to_millis};
use crate::models::{RankingEntry, RankingSnapshot, Score};
use crate::storage::traits::RankingStore;
use crate::{Error, Result};
use rusqlite::{Connection, params};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

const BACKEND: &str = "sqlite_rankings";

/// Rankings in the `trending_rankings` table, one row per
/// `(category, rank)`.
pub struct SqliteRankings {
    conn: Mutex<Connection>,
}

/// Raw column values of one ranking row.
struct RankingRow {
    rank: i64,
    title: String,
    keyword: Option<String>,
    note: Option<String>,
    score: Option<f64>,
    updated_at: i64,
}

impl SqliteRankings {
    /// Opens (or creates) the ranking store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the database cannot be
    /// opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let conn = open_connection(Some(&db_path.into()))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory ranking store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the schema cannot be
    /// created.
    pub fn in_memory() -> Result<Self> {
        let conn = open_connection(None)?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS trending_rankings (
                category TEXT NOT NULL,
                rank INTEGER NOT NULL,
                title TEXT NOT NULL,
                keyword TEXT,
                note TEXT,
                score REAL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (category, rank)
            );",
        )
        .map_err(storage_error("create_trending_rankings_table"))
    }

    fn read_snapshot(conn: &Connection, category: &str) -> Result<Option<RankingSnapshot>> {
        let mut stmt = conn
            .prepare_cached(
                "SELECT rank, title, keyword, note, score, updated_at
                 FROM trending_rankings WHERE category = ?1 ORDER BY rank",
            )
            .map_err(storage_error("prepare_select_rankings"))?;
        let rows = stmt
            .query_map(params![category], |row| {
                Ok(RankingRow {
                    rank: row.get(0)?,
                    title: row.get(1)?,
                    keyword: row.get(2)?,
                    note: row.get(3)?,
                    score: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })
            .map_err(storage_error("select_rankings"))?;

        let mut entries = Vec::new();
        let mut latest = None;
        for row in rows {
            let (entry, at) = row
                .map_err(storage_error("read_ranking_row"))?
                .into_entry(category)?;
            latest = latest.max(Some(at));
            entries.push(entry);
        }

        let Some(latest) = latest else {
            return Ok(None);
        };
        let updated_at = from_millis(latest).ok_or_else(|| Error::StorageUnavailable {
            operation: "decode_ranking_row".to_string(),
            cause: format!("{category}: bad updated_at {latest}"),
        })?;
        RankingSnapshot::new(category, updated_at, entries).map(Some)
    }
}

impl RankingRow {
    fn into_entry(self, category: &str) -> Result<(RankingEntry, i64)> {
        let corrupt = |cause: String| Error::StorageUnavailable {
            operation: "decode_ranking_row".to_string(),
            cause: format!("{category} rank {}: {cause}", self.rank),
        };
        let rank = u32::try_from(self.rank).map_err(|e| corrupt(e.to_string()))?;
        let score = self
            .score
            .map(Score::new)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let entry = RankingEntry::new(rank, self.title)
            .map_err(|e| corrupt(e.to_string()))?
            .with_keyword(self.keyword)
            .with_note(self.note)
            .with_score(score);
        Ok((entry, self.updated_at))
    }
}

impl RankingStore for SqliteRankings {
    #[tracing::instrument(skip(self, snapshot), fields(backend = BACKEND, category = %snapshot.category, count = snapshot.len()))]
    fn replace_rankings(&self, snapshot: &RankingSnapshot) -> Result<usize> {
        let start = Instant::now();
        let updated_at = to_millis(snapshot.updated_at);
        let conn = acquire_lock(&self.conn);
        let result = in_transaction(&conn, |conn| {
            conn.execute(
                "DELETE FROM trending_rankings WHERE category = ?1",
                params![snapshot.category],
            )
            .map_err(storage_error("clear_rankings"))?;
            let mut stmt = conn
                .prepare_cached(
                    "INSERT INTO trending_rankings
                        (category, rank, title, keyword, note, score, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(storage_error("prepare_insert_ranking"))?;
            for entry in &snapshot.entries {
                stmt.execute(params![
                    snapshot.category,
                    entry.rank,
                    entry.title,
                    entry.keyword,
                    entry.note,
                    entry.score.map(Score::value),
                    updated_at,
                ])
                .map_err(storage_error("insert_ranking"))?;
            }
            Ok(snapshot.len())
        });
        record_operation_metrics(BACKEND, "replace_rankings", start, &result);
        result
    }

    fn select_rankings(&self, category: &str) -> Result<Option<RankingSnapshot>> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let result = Self::read_snapshot(&conn, category);
        record_operation_metrics(BACKEND, "select_rankings", start, &result);
        result
    }
}
