//! Copy-out of high-value items into the archive.

use crate::Result;
use crate::models::{ContentItem, Score};
use crate::storage::traits::{ArchiveSink, ContentRepository};
use std::sync::Arc;

/// Forwards items at or above a score threshold to an [`ArchiveSink`].
///
/// Archiving copies; the live item stays in the store and may later be
/// evicted without touching its archived copy.
pub struct ArchiveService {
    sink: Arc<dyn ArchiveSink>,
    threshold: Score,
}

impl ArchiveService {
    /// Creates a service archiving at or above `threshold`.
    #[must_use]
    pub fn new(sink: Arc<dyn ArchiveSink>, threshold: Score) -> Self {
        Self { sink, threshold }
    }

    /// The archive threshold.
    #[must_use]
    pub const fn threshold(&self) -> Score {
        self.threshold
    }

    /// The sink items are written to.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn ArchiveSink> {
        &self.sink
    }

    /// Archives the items in `items` that meet the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the sink rejects the
    /// write.
    pub fn forward(&self, items: &[ContentItem]) -> Result<usize> {
        let eligible: Vec<ContentItem> = items
            .iter()
            .filter(|item| item.score >= self.threshold)
            .cloned()
            .collect();
        if eligible.is_empty() {
            return Ok(0);
        }
        let written = self.sink.archive(&eligible)?;
        metrics::counter!("archive_items_total").increment(written as u64);
        Ok(written)
    }

    /// Archives every live item, across categories, that meets the
    /// threshold.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the repository read or
    /// the sink write fails.
    #[tracing::instrument(skip_all, fields(threshold = %self.threshold))]
    pub fn sweep(&self, repository: &dyn ContentRepository) -> Result<usize> {
        let candidates = repository.select_above_score(self.threshold)?;
        let written = self.forward(&candidates)?;
        tracing::info!(candidates = candidates.len(), written, "Archive sweep complete");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{InMemoryArchive, InMemoryRepository};
    use crate::storage::traits::ConflictKey;
    use chrono::{TimeZone, Utc};

    fn item(category: &str, link: &str, score: f64) -> ContentItem {
        ContentItem::new(
            category,
            link,
            "t",
            "b",
            Score::new(score).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_forward_filters_by_threshold() {
        let sink = Arc::new(InMemoryArchive::new());
        let service = ArchiveService::new(sink.clone(), Score::new(7.0).unwrap());
        let written = service
            .forward(&[
                item("K-Pop", "https://a/1", 6.99),
                item("K-Pop", "https://a/2", 7.0),
                item("K-Pop", "https://a/3", 9.5),
            ])
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(sink.count().unwrap(), 2);
    }

    #[test]
    fn test_sweep_crosses_categories() {
        let repo = InMemoryRepository::new();
        repo.upsert(
            &[
                item("K-Pop", "https://a/1", 8.0),
                item("K-Movie", "https://m/1", 7.5),
                item("K-Movie", "https://m/2", 2.0),
            ],
            ConflictKey::Identity,
        )
        .unwrap();
        let sink = Arc::new(InMemoryArchive::new());
        let service = ArchiveService::new(sink.clone(), Score::new(7.0).unwrap());

        assert_eq!(service.sweep(&repo).unwrap(), 2);
        // idempotent on link
        service.sweep(&repo).unwrap();
        assert_eq!(sink.count().unwrap(), 2);
    }

    #[test]
    fn test_sweep_propagates_storage_failure() {
        let repo = InMemoryRepository::new();
        repo.set_unavailable(true);
        let service = ArchiveService::new(Arc::new(InMemoryArchive::new()), Score::ZERO);
        assert!(service.sweep(&repo).is_err());
    }
}
