//! Ranking store trait.

use crate::Result;
use crate::models::RankingSnapshot;

/// Holds the latest trending list per category.
pub trait RankingStore: Send + Sync {
    /// Replaces the category's ranking with `snapshot`, returning the number
    /// of entries written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the write fails; the
    /// previous ranking is then left in place.
    fn replace_rankings(&self, snapshot: &RankingSnapshot) -> Result<usize>;

    /// The category's latest ranking, if one was ever stored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the read fails.
    fn select_rankings(&self, category: &str) -> Result<Option<RankingSnapshot>>;
}
