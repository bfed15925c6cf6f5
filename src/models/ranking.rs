//! Per-category trending rankings.

use super::content::Score;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most entries kept in one category's ranking.
pub const MAX_RANKINGS: usize = 10;

/// One position in a category's trending list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// 1-based position.
    pub rank: u32,
    /// Display title (song, show, place).
    pub title: String,
    /// Search keyword for the entry, often in the source language.
    pub keyword: Option<String>,
    /// Short reason the entry is trending.
    pub note: Option<String>,
    /// Popularity score as reported by the provider.
    pub score: Option<Score>,
}

impl RankingEntry {
    /// Creates an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for rank zero or a blank title.
    pub fn new(rank: u32, title: impl Into<String>) -> Result<Self> {
        let title = title.into();
        if rank == 0 {
            return Err(Error::InvalidInput("rank must be at least 1".to_string()));
        }
        if title.trim().is_empty() {
            return Err(Error::InvalidInput("ranking title must not be empty".to_string()));
        }
        Ok(Self {
            rank,
            title: title.trim().to_string(),
            keyword: None,
            note: None,
            score: None,
        })
    }

    /// Sets the search keyword. Blank values are treated as absent.
    #[must_use]
    pub fn with_keyword(mut self, keyword: Option<String>) -> Self {
        self.keyword = keyword.filter(|k| !k.trim().is_empty());
        self
    }

    /// Sets the note. Blank values are treated as absent.
    #[must_use]
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note.filter(|n| !n.trim().is_empty());
        self
    }

    /// Sets the score.
    #[must_use]
    pub const fn with_score(mut self, score: Option<Score>) -> Self {
        self.score = score;
        self
    }
}

/// The current trending list of one category.
///
/// Each snapshot replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    /// Category the ranking belongs to.
    pub category: String,
    /// When the ranking was produced.
    pub updated_at: DateTime<Utc>,
    /// Entries ordered by rank, at most [`MAX_RANKINGS`], ranks unique.
    pub entries: Vec<RankingEntry>,
}

impl RankingSnapshot {
    /// Builds a snapshot, ordering entries by rank.
    ///
    /// For a repeated rank the first entry wins; entries past
    /// [`MAX_RANKINGS`] are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the category is blank.
    pub fn new(
        category: impl Into<String>,
        updated_at: DateTime<Utc>,
        mut entries: Vec<RankingEntry>,
    ) -> Result<Self> {
        let category = category.into();
        if category.trim().is_empty() {
            return Err(Error::InvalidInput("category must not be empty".to_string()));
        }
        entries.sort_by_key(|entry| entry.rank);
        entries.dedup_by_key(|entry| entry.rank);
        entries.truncate(MAX_RANKINGS);
        Ok(Self {
            category,
            updated_at,
            entries,
        })
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
