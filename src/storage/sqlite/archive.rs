//! `SQLite`-backed archive.

use super::connection::{
    acquire_lock, in_transaction, open_connection, record_operation_metrics, storage_error,
};
use super::row::to_millis;
use crate::Result;
use crate::models::{ContentItem, normalize_link};
use crate::storage::traits::ArchiveSink;
use chrono::Utc;
use rusqlite::{Connection, params};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

const BACKEND: &str = "sqlite_archive";

/// Uncapped archive in the `archived_items` table, upserted on
/// `original_link`.
pub struct SqliteArchive {
    conn: Mutex<Connection>,
}

impl SqliteArchive {
    /// Opens (or creates) the archive at `db_path`.
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

    /// Creates an in-memory archive.
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
            "CREATE TABLE IF NOT EXISTS archived_items (
                original_link TEXT PRIMARY KEY,
                item_id TEXT NOT NULL,
                category TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                score REAL NOT NULL,
                image_url TEXT,
                keyword TEXT,
                created_at INTEGER NOT NULL,
                published_at INTEGER,
                archived_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_archived_items_category ON archived_items(category);",
        )
        .map_err(storage_error("create_archived_items_table"))
    }
}

impl ArchiveSink for SqliteArchive {
    #[tracing::instrument(skip(self, items), fields(backend = BACKEND, count = items.len()))]
    fn archive(&self, items: &[ContentItem]) -> Result<usize> {
        let start = Instant::now();
        let archived_at = to_millis(Utc::now());
        let conn = acquire_lock(&self.conn);
        let result = in_transaction(&conn, |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "INSERT INTO archived_items (original_link, item_id, category, title, body,
                        score, image_url, keyword, created_at, published_at, archived_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(original_link) DO UPDATE SET
                        item_id = excluded.item_id,
                        category = excluded.category,
                        title = excluded.title,
                        body = excluded.body,
                        score = excluded.score,
                        image_url = excluded.image_url,
                        keyword = excluded.keyword,
                        published_at = excluded.published_at,
                        archived_at = excluded.archived_at",
                )
                .map_err(storage_error("prepare_archive"))?;
            for item in items {
                stmt.execute(params![
                    normalize_link(&item.link),
                    item.key.as_str(),
                    item.category,
                    item.title,
                    item.body,
                    item.score.value(),
                    item.image_url,
                    item.keyword,
                    to_millis(item.created_at),
                    item.published_at.map(to_millis),
                    archived_at,
                ])
                .map_err(storage_error("archive_item"))?;
            }
            Ok(items.len())
        });
        record_operation_metrics(BACKEND, "archive", start, &result);
        result
    }

    fn count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM archived_items", [], |row| row.get(0))
            .map_err(storage_error("count_archive"))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
