//! Live-item repository trait.

use crate::Result;
use crate::models::{ContentItem, ItemKey, Score};

/// Column set that decides whether an upsert replaces an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKey {
    /// The item's identity key.
    Identity,
    /// The `(category, link)` pair.
    Link,
}

impl ConflictKey {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Link => "link",
        }
    }
}

/// Durable backing store for live items.
///
/// Every failure is reported as [`crate::Error::StorageUnavailable`] so the
/// caller can leave its in-memory view untouched and retry next cycle.
pub trait ContentRepository: Send + Sync {
    /// Inserts or replaces items, returning the number written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the write fails. A
    /// failed call writes nothing.
    fn upsert(&self, items: &[ContentItem], conflict: ConflictKey) -> Result<usize>;

    /// Deletes items by identity key, returning the number removed.
    ///
    /// Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the delete fails.
    fn delete_by_ids(&self, ids: &[ItemKey]) -> Result<usize>;

    /// Returns every item in a category, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the read fails.
    fn select_by_category(&self, category: &str) -> Result<Vec<ContentItem>>;

    /// Returns every item, across categories, scoring at or above `threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the read fails.
    fn select_above_score(&self, threshold: Score) -> Result<Vec<ContentItem>>;
}
