//! `SQLite`-backed live-item repository.

use super::connection::{
    acquire_lock, in_transaction, open_connection, record_operation_metrics, storage_error,
};
use super::row::{ITEM_COLUMNS, ItemRow, to_millis};
use crate::models::{ContentItem, ItemKey, Score};
use crate::storage::traits::{ConflictKey, ContentRepository};
use crate::Result;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "sqlite_live";

/// Live items stored in the `live_items` table.
///
/// # Schema
///
/// - `id` (primary key): identity key derived from the link
/// - `(category, link)`: unique, the alternate conflict target
/// - `score`: indexed for threshold sweeps
/// - timestamps in epoch milliseconds
pub struct SqliteRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteRepository {
    /// Opens (or creates) the repository at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the database cannot be
    /// opened or the schema cannot be created.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_connection(Some(&db_path))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        })
    }

    /// Creates an in-memory repository.
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
            db_path: None,
        })
    }

    /// Database path, `None` for in-memory.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS live_items (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                link TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                score REAL NOT NULL,
                image_url TEXT,
                keyword TEXT,
                created_at INTEGER NOT NULL,
                published_at INTEGER,
                UNIQUE (category, link)
            );
            CREATE INDEX IF NOT EXISTS idx_live_items_category ON live_items(category);
            CREATE INDEX IF NOT EXISTS idx_live_items_score ON live_items(score DESC);",
        )
        .map_err(storage_error("create_live_items_table"))
    }

    fn upsert_sql(conflict: ConflictKey) -> String {
        let target = match conflict {
            ConflictKey::Identity => "id",
            ConflictKey::Link => "category, link",
        };
        format!(
            "INSERT INTO live_items ({ITEM_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT({target}) DO UPDATE SET
                id = excluded.id,
                category = excluded.category,
                link = excluded.link,
                title = excluded.title,
                body = excluded.body,
                score = excluded.score,
                image_url = excluded.image_url,
                keyword = excluded.keyword,
                created_at = excluded.created_at,
                published_at = excluded.published_at"
        )
    }

    fn select(conn: &Connection, sql: &str, param: &dyn rusqlite::ToSql) -> Result<Vec<ContentItem>> {
        let mut stmt = conn.prepare(sql).map_err(storage_error("prepare_select"))?;
        let rows = stmt
            .query_map([param], ItemRow::from_row)
            .map_err(storage_error("select_items"))?;
        rows.map(|row| row.map_err(storage_error("read_row")).and_then(ItemRow::into_item))
            .collect()
    }
}

impl ContentRepository for SqliteRepository {
    #[instrument(skip(self, items), fields(backend = BACKEND, count = items.len(), conflict = conflict.as_str()))]
    fn upsert(&self, items: &[ContentItem], conflict: ConflictKey) -> Result<usize> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let sql = Self::upsert_sql(conflict);
        let result = in_transaction(&conn, |conn| {
            let mut stmt = conn.prepare_cached(&sql).map_err(storage_error("prepare_upsert"))?;
            for item in items {
                stmt.execute(params![
                    item.key.as_str(),
                    item.category,
                    item.link,
                    item.title,
                    item.body,
                    item.score.value(),
                    item.image_url,
                    item.keyword,
                    to_millis(item.created_at),
                    item.published_at.map(to_millis),
                ])
                .map_err(storage_error("upsert_item"))?;
            }
            Ok(items.len())
        });
        record_operation_metrics(BACKEND, "upsert", start, &result);
        result
    }

    #[instrument(skip(self, ids), fields(backend = BACKEND, count = ids.len()))]
    fn delete_by_ids(&self, ids: &[ItemKey]) -> Result<usize> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let result = in_transaction(&conn, |conn| {
            let mut stmt = conn
                .prepare_cached("DELETE FROM live_items WHERE id = ?1")
                .map_err(storage_error("prepare_delete"))?;
            let mut removed = 0;
            for id in ids {
                removed += stmt
                    .execute(params![id.as_str()])
                    .map_err(storage_error("delete_item"))?;
            }
            Ok(removed)
        });
        record_operation_metrics(BACKEND, "delete_by_ids", start, &result);
        result
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    fn select_by_category(&self, category: &str) -> Result<Vec<ContentItem>> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let sql = format!("SELECT {ITEM_COLUMNS} FROM live_items WHERE category = ?1");
        let result = Self::select(&conn, &sql, &category);
        record_operation_metrics(BACKEND, "select_by_category", start, &result);
        result
    }

    #[instrument(skip(self), fields(backend = BACKEND, threshold = threshold.value()))]
    fn select_above_score(&self, threshold: Score) -> Result<Vec<ContentItem>> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM live_items WHERE score >= ?1 ORDER BY score DESC"
        );
        let result = Self::select(&conn, &sql, &threshold.value());
        record_operation_metrics(BACKEND, "select_above_score", start, &result);
        result
    }
}
