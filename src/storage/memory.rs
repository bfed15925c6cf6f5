//! In-memory storage backends.
//!
//! Default backends for single-process runs and the doubles used in tests.
//! The repository can be switched into an unavailable state to exercise the
//! storage-failure paths.

use super::traits::{ArchiveSink, ConflictKey, ContentRepository, RankingStore};
use crate::models::{ContentItem, ItemKey, RankingSnapshot, Score, normalize_link};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("In-memory storage mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// In-memory live-item repository.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    rows: Mutex<HashMap<ItemKey, ContentItem>>,
    unavailable: AtomicBool,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    /// Returns true if no rows are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.rows).is_empty()
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable {
                operation: operation.to_string(),
                cause: "repository marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl ContentRepository for InMemoryRepository {
    fn upsert(&self, items: &[ContentItem], conflict: ConflictKey) -> Result<usize> {
        self.check("upsert")?;
        let mut rows = lock(&self.rows);
        for item in items {
            if conflict == ConflictKey::Link {
                let link = normalize_link(&item.link);
                rows.retain(|key, row| {
                    key == &item.key
                        || row.category != item.category
                        || normalize_link(&row.link) != link
                });
            }
            rows.insert(item.key.clone(), item.clone());
        }
        Ok(items.len())
    }

    fn delete_by_ids(&self, ids: &[ItemKey]) -> Result<usize> {
        self.check("delete_by_ids")?;
        let mut rows = lock(&self.rows);
        Ok(ids.iter().filter(|id| rows.remove(*id).is_some()).count())
    }

    fn select_by_category(&self, category: &str) -> Result<Vec<ContentItem>> {
        self.check("select_by_category")?;
        Ok(lock(&self.rows)
            .values()
            .filter(|item| item.category == category)
            .cloned()
            .collect())
    }

    fn select_above_score(&self, threshold: Score) -> Result<Vec<ContentItem>> {
        self.check("select_above_score")?;
        Ok(lock(&self.rows)
            .values()
            .filter(|item| item.score >= threshold)
            .cloned()
            .collect())
    }
}

/// In-memory archive keyed by normalized source link.
#[derive(Debug, Default)]
pub struct InMemoryArchive {
    items: Mutex<HashMap<String, ContentItem>>,
}

impl InMemoryArchive {
    /// Creates an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every archived item.
    #[must_use]
    pub fn items(&self) -> Vec<ContentItem> {
        lock(&self.items).values().cloned().collect()
    }
}

impl ArchiveSink for InMemoryArchive {
    fn archive(&self, items: &[ContentItem]) -> Result<usize> {
        let mut archived = lock(&self.items);
        for item in items {
            archived.insert(normalize_link(&item.link), item.clone());
        }
        Ok(items.len())
    }

    fn count(&self) -> Result<usize> {
        Ok(lock(&self.items).len())
    }
}

/// In-memory ranking store, one snapshot per category.
#[derive(Debug, Default)]
pub struct InMemoryRankings {
    snapshots: Mutex<HashMap<String, RankingSnapshot>>,
}

impl InMemoryRankings {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RankingStore for InMemoryRankings {
    fn replace_rankings(&self, snapshot: &RankingSnapshot) -> Result<usize> {
        lock(&self.snapshots).insert(snapshot.category.clone(), snapshot.clone());
        Ok(snapshot.len())
    }

    fn select_rankings(&self, category: &str) -> Result<Option<RankingSnapshot>> {
        Ok(lock(&self.snapshots).get(category).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(link: &str, score: f64) -> ContentItem {
        ContentItem::new(
            "K-Pop",
            link,
            "title",
            "body",
            Score::new(score).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_upsert_replaces_by_identity() {
        let repo = InMemoryRepository::new();
        repo.upsert(&[item("https://a/1", 5.0)], ConflictKey::Identity)
            .unwrap();
        repo.upsert(&[item("https://a/1", 8.0)], ConflictKey::Identity)
            .unwrap();
        let rows = repo.select_by_category("K-Pop").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, Score::new(8.0).unwrap());
    }

    #[test]
    fn test_select_above_score_is_inclusive() {
        let repo = InMemoryRepository::new();
        repo.upsert(
            &[item("https://a/1", 6.9), item("https://a/2", 7.0), item("https://a/3", 9.0)],
            ConflictKey::Identity,
        )
        .unwrap();
        let above = repo.select_above_score(Score::new(7.0).unwrap()).unwrap();
        assert_eq!(above.len(), 2);
    }

    #[test]
    fn test_unavailable_fails_every_verb() {
        let repo = InMemoryRepository::new();
        repo.set_unavailable(true);
        assert!(matches!(
            repo.upsert(&[item("https://a/1", 5.0)], ConflictKey::Identity),
            Err(Error::StorageUnavailable { .. })
        ));
        assert!(repo.delete_by_ids(&[]).is_err());
        assert!(repo.select_by_category("K-Pop").is_err());
        repo.set_unavailable(false);
        assert!(repo.is_empty());
    }

    #[test]
    fn test_delete_ignores_unknown() {
        let repo = InMemoryRepository::new();
        let stored = item("https://a/1", 5.0);
        repo.upsert(std::slice::from_ref(&stored), ConflictKey::Identity)
            .unwrap();
        let removed = repo
            .delete_by_ids(&[stored.key.clone(), ItemKey::new("missing")])
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_rankings_replace_per_category() {
        use crate::models::RankingEntry;

        let rankings = InMemoryRankings::new();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let snapshot = |titles: &[&str]| {
            let entries = titles
                .iter()
                .zip(1..)
                .map(|(title, rank)| RankingEntry::new(rank, *title).unwrap())
                .collect();
            RankingSnapshot::new("K-Pop", at, entries).unwrap()
        };
        rankings.replace_rankings(&snapshot(&["a", "b"])).unwrap();
        rankings.replace_rankings(&snapshot(&["c"])).unwrap();

        let stored = rankings.select_rankings("K-Pop").unwrap().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.entries[0].title, "c");
        assert!(rankings.select_rankings("K-Drama").unwrap().is_none());
    }

    #[test]
    fn test_archive_is_idempotent_on_link() {
        let archive = InMemoryArchive::new();
        archive.archive(&[item("https://a/1", 8.0)]).unwrap();
        archive.archive(&[item("https://A/1/", 9.0)]).unwrap();
        assert_eq!(archive.count().unwrap(), 1);
    }
}
