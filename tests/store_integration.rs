//! Integration tests for the ranked store over `SQLite` persistence.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use trendvault::clock::ManualClock;
use trendvault::config::{StoreBackend, TrendvaultConfig};
use trendvault::models::{ContentItem, ItemKey, Score};
use trendvault::services::{
    ArchiveService, BoundedRankedStore, InsertOutcome, StorePolicy, open_storage,
};
use trendvault::storage::{
    ArchiveSink, ConflictKey, ContentRepository, InMemoryRepository, RankingStore,
    SqliteArchive, SqliteRepository,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

fn item(category: &str, link: &str, score: f64, age_hours: i64) -> ContentItem {
    ContentItem::new(
        category,
        link,
        format!("title for {link}"),
        "body",
        Score::new(score).unwrap(),
        start() - Duration::hours(age_hours),
    )
    .unwrap()
}

fn store(repository: Arc<dyn ContentRepository>, capacity: usize) -> BoundedRankedStore {
    BoundedRankedStore::new(
        StorePolicy::default().with_capacity(capacity),
        repository,
        Arc::new(ManualClock::new(start())),
    )
}

#[test]
fn test_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("trendvault.db");

    {
        let repository = Arc::new(SqliteRepository::new(&db_path).unwrap());
        let store = store(repository, 2);
        store.insert("K-Pop", item("K-Pop", "https://a/1", 5.0, 1)).unwrap();
        store.insert("K-Pop", item("K-Pop", "https://a/2", 8.0, 1)).unwrap();
        store.insert("K-Pop", item("K-Pop", "https://a/3", 6.0, 30)).unwrap();
        store.insert("Drama", item("Drama", "https://d/1", 7.0, 1)).unwrap();

        let report = store.maintain("K-Pop").unwrap();
        assert_eq!(report.plan.stale.len(), 1);
        assert!(report.plan.low_score.is_empty());
        assert_eq!(report.size, 2);
    }

    let reopened = store(Arc::new(SqliteRepository::new(&db_path).unwrap()), 2);
    let links: Vec<String> = reopened
        .query("K-Pop")
        .unwrap()
        .into_iter()
        .map(|item| item.link)
        .collect();
    assert_eq!(links, ["https://a/2", "https://a/1"]);
    assert_eq!(reopened.len("Drama").unwrap(), 1);
}

#[test]
fn test_reinsert_after_reopen_replaces_row() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("trendvault.db");
    let repository = Arc::new(SqliteRepository::new(&db_path).unwrap());

    let first = store(repository.clone(), 5);
    first.insert("K-Pop", item("K-Pop", "https://a/1", 5.0, 1)).unwrap();

    let second = store(repository.clone(), 5);
    let outcome = second
        .insert("K-Pop", item("K-Pop", "https://a/1", 9.0, 0))
        .unwrap();
    assert_eq!(outcome, InsertOutcome::Replaced);

    let rows = repository.select_by_category("K-Pop").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].score, Score::new(9.0).unwrap());
}

#[test]
fn test_link_conflict_replaces_foreign_identity() {
    let repository = SqliteRepository::in_memory().unwrap();
    let original = item("K-Pop", "https://a/1", 5.0, 1);
    repository
        .upsert(std::slice::from_ref(&original), ConflictKey::Identity)
        .unwrap();

    let mut rekeyed = item("K-Pop", "https://a/1", 7.5, 0);
    rekeyed.key = ItemKey::new("external-id-42");
    repository
        .upsert(std::slice::from_ref(&rekeyed), ConflictKey::Link)
        .unwrap();

    let rows = repository.select_by_category("K-Pop").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key, ItemKey::new("external-id-42"));
    assert_eq!(rows[0].score, Score::new(7.5).unwrap());
}

#[test]
fn test_sweep_is_idempotent_across_runs() {
    let dir = TempDir::new().unwrap();
    let config = TrendvaultConfig::default().with_sqlite(dir.path().join("trendvault.db"));
    assert_eq!(config.store.backend, StoreBackend::Sqlite);

    let storage = open_storage(&config).unwrap();
    let (repository, sink) = (storage.repository, storage.archive);
    let store = store(repository.clone(), 10);
    store.insert("K-Pop", item("K-Pop", "https://a/1", 8.0, 1)).unwrap();
    store.insert("K-Pop", item("K-Pop", "https://a/2", 6.5, 1)).unwrap();
    store.insert("Drama", item("Drama", "https://d/1", 7.0, 1)).unwrap();

    let archive = ArchiveService::new(sink, Score::new(7.0).unwrap());
    assert_eq!(archive.sweep(repository.as_ref()).unwrap(), 2);
    assert_eq!(archive.sweep(repository.as_ref()).unwrap(), 2);
    assert_eq!(archive.sink().count().unwrap(), 2);

    // Archived copies outlive eviction from the live store.
    repository
        .delete_by_ids(&[ItemKey::for_item("K-Pop", "https://a/1")])
        .unwrap();
    let reopened = SqliteArchive::new(dir.path().join("trendvault.db")).unwrap();
    assert_eq!(reopened.count().unwrap(), 2);
}

/// Files one link under two categories, then evicts it from the first.
fn assert_categories_isolated(repository: Arc<dyn ContentRepository>) {
    let first = store(repository.clone(), 1);
    first.insert("K-Pop", item("K-Pop", "https://shared/1", 5.0, 1)).unwrap();
    first.insert("K-Drama", item("K-Drama", "https://shared/1", 6.0, 1)).unwrap();

    assert_eq!(repository.select_by_category("K-Pop").unwrap().len(), 1);
    assert_eq!(repository.select_by_category("K-Drama").unwrap().len(), 1);

    // A better K-Pop item pushes the shared link out of K-Pop only.
    first.insert("K-Pop", item("K-Pop", "https://a/9", 9.0, 0)).unwrap();
    let report = first.maintain("K-Pop").unwrap();
    assert_eq!(report.plan.low_score.len(), 1);

    let drama = repository.select_by_category("K-Drama").unwrap();
    assert_eq!(drama.len(), 1);
    assert_eq!(drama[0].link, "https://shared/1");

    let reloaded = store(repository, 1);
    assert_eq!(reloaded.len("K-Pop").unwrap(), 1);
    assert_eq!(reloaded.len("K-Drama").unwrap(), 1);
}

#[test]
fn test_same_link_in_two_categories_memory() {
    assert_categories_isolated(Arc::new(InMemoryRepository::new()));
}

#[test]
fn test_same_link_in_two_categories_sqlite() {
    let dir = TempDir::new().unwrap();
    assert_categories_isolated(Arc::new(
        SqliteRepository::new(dir.path().join("trendvault.db")).unwrap(),
    ));
}

#[test]
fn test_memory_backend_is_default() {
    let config = TrendvaultConfig::default();
    assert_eq!(config.store.backend, StoreBackend::Memory);
    let storage = open_storage(&config).unwrap();
    assert!(storage.repository.select_by_category("K-Pop").unwrap().is_empty());
    assert_eq!(storage.archive.count().unwrap(), 0);
    assert!(storage.rankings.select_rankings("K-Pop").unwrap().is_none());
}
