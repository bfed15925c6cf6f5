//! Connection handling shared by the `SQLite` backends.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Acquires a connection lock, recovering from poisoning.
///
/// A panic inside a previous critical section leaves the connection itself
/// usable; the poison is logged and counted, not propagated.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Opens a database file, or an in-memory database when `path` is `None`,
/// and applies [`configure_connection`].
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the database cannot be opened.
pub fn open_connection(path: Option<&Path>) -> Result<Connection> {
    let conn = match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(storage_error("create_db_dir"))?;
            }
            Connection::open(path).map_err(storage_error("open_sqlite"))?
        },
        None => Connection::open_in_memory().map_err(storage_error("open_sqlite_in_memory"))?,
    };
    configure_connection(&conn);
    Ok(conn)
}

/// Applies WAL journaling, NORMAL synchronous mode and a 5 s busy timeout.
///
/// Pragma failures are ignored: in-memory databases report `memory` for
/// `journal_mode` and still work.
pub fn configure_connection(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

/// Maps any displayable error into [`Error::StorageUnavailable`].
pub fn storage_error<E: std::fmt::Display>(operation: &'static str) -> impl Fn(E) -> Error {
    move |e| Error::StorageUnavailable {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// Runs `body` inside `BEGIN IMMEDIATE` / `COMMIT`, rolling back on error.
///
/// # Errors
///
/// Propagates the body's error, or [`Error::StorageUnavailable`] if the
/// transaction cannot be opened or committed.
pub fn in_transaction<T>(conn: &Connection, body: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(storage_error("begin_transaction"))?;
    match body(conn) {
        Ok(value) => {
            conn.execute("COMMIT", [])
                .map_err(storage_error("commit_transaction"))?;
            Ok(value)
        },
        Err(e) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(e)
        },
    }
}

/// Records `storage_operations_total` and `storage_operation_duration_ms`.
pub fn record_operation_metrics<T>(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    result: &Result<T>,
) {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
