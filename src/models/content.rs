//! Content items and their identity.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// Comparable item score.
///
/// Wraps a finite `f64` so scores are totally ordered. The scale is up to
/// the caller (0-10 and 0-100 both occur upstream); the store only compares.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Score(f64);

impl Score {
    /// Lowest possible score.
    pub const ZERO: Self = Self(0.0);

    /// Creates a score, rejecting NaN and infinities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `value` is not finite.
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() {
            Ok(Self(value))
        } else {
            Err(Error::InvalidInput(format!("score must be finite, got {value}")))
        }
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl TryFrom<f64> for Score {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Score> for f64 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Stable identity key of a content item.
///
/// Derived from the item's category and source link: the normalized pair is
/// hashed with SHA-256, so two spellings of the same URL map to one key within
/// a category, and the same URL filed under two categories gets two keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Wraps an existing key string (e.g. one read back from storage).
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the key for a source link filed under `category`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use trendvault::ItemKey;
    ///
    /// let a = ItemKey::for_item("K-Pop", "HTTPS://News.Example.com/a/1/");
    /// let b = ItemKey::for_item(" k-pop ", "https://news.example.com/a/1#comments");
    /// assert_eq!(a, b);
    /// assert_ne!(a, ItemKey::for_item("K-Drama", "https://news.example.com/a/1"));
    /// assert_eq!(a.as_str().len(), 64);
    /// ```
    #[must_use]
    pub fn for_item(category: &str, link: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_category(category).as_bytes());
        hasher.update([0u8]);
        hasher.update(normalize_link(link).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a category name for identity hashing.
#[must_use]
pub fn normalize_category(category: &str) -> String {
    category.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Normalizes a link for identity hashing.
///
/// Trims whitespace, drops the fragment and trailing slashes, and lowercases
/// the scheme and host. Path and query keep their case.
#[must_use]
pub fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    let without_slash = without_fragment.trim_end_matches('/');

    let authority_start = without_slash.find("://").map_or(0, |pos| pos + 3);
    let authority_end = without_slash[authority_start..]
        .find('/')
        .map_or(without_slash.len(), |pos| authority_start + pos);

    let mut normalized = without_slash[..authority_end].to_lowercase();
    normalized.push_str(&without_slash[authority_end..]);
    normalized
}

/// A piece of content held by the live store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Identity key, derived from `category` and `link`.
    pub key: ItemKey,
    /// Category the item belongs to.
    pub category: String,
    /// Source link.
    pub link: String,
    /// Display title.
    pub title: String,
    /// Body text or summary.
    pub body: String,
    /// Ranking score.
    pub score: Score,
    /// Optional image reference.
    pub image_url: Option<String>,
    /// Optional trending subject the item is about.
    pub keyword: Option<String>,
    /// When the item was created by the pipeline.
    pub created_at: DateTime<Utc>,
    /// When the source published it, if known.
    pub published_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// Creates an item with the identity key derived from `category` and `link`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the category or link is blank.
    pub fn new(
        category: impl Into<String>,
        link: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        score: Score,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let category = category.into();
        let link = link.into();
        if category.trim().is_empty() {
            return Err(Error::InvalidInput("category must not be empty".to_string()));
        }
        if link.trim().is_empty() {
            return Err(Error::InvalidInput("link must not be empty".to_string()));
        }
        Ok(Self {
            key: ItemKey::for_item(&category, &link),
            category,
            link,
            title: title.into(),
            body: body.into(),
            score,
            image_url: None,
            keyword: None,
            created_at,
            published_at: None,
        })
    }

    /// Sets the image reference. Blank values are treated as absent.
    #[must_use]
    pub fn with_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url.filter(|url| !url.trim().is_empty());
        self
    }

    /// Sets the source publication time.
    #[must_use]
    pub const fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    /// Sets the trending subject.
    #[must_use]
    pub fn with_keyword(mut self, keyword: Option<String>) -> Self {
        self.keyword = keyword.filter(|k| !k.trim().is_empty());
        self
    }

    /// Time used for age ordering: publication time if known, else creation.
    #[must_use]
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }

    /// Returns true if the item is older than `horizon` at `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, horizon: chrono::Duration) -> bool {
        self.observed_at() < now - horizon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_score_rejects_nan() {
        assert!(Score::new(f64::NAN).is_err());
        assert!(Score::new(f64::INFINITY).is_err());
        assert!(Score::new(7.5).is_ok());
    }

    #[test]
    fn test_score_total_order() {
        let low = Score::new(-1.0).unwrap();
        let high = Score::new(9.9).unwrap();
        assert!(low < high);
        assert_eq!(Score::new(0.0).unwrap(), Score::ZERO);
        assert_eq!(high.to_string(), "9.90");
    }

    #[test]
    fn test_score_deserialize_validates() {
        let ok: Score = serde_json::from_str("4.5").unwrap();
        assert!((ok.value() - 4.5).abs() < f64::EPSILON);
        assert!(serde_json::from_str::<Score>("\"x\"").is_err());
    }

    #[test]
    fn test_normalize_link() {
        assert_eq!(
            normalize_link("  HTTPS://News.Example.COM/Path/To/#frag "),
            "https://news.example.com/Path/To"
        );
        assert_eq!(normalize_link("example.com/a?b=C"), "example.com/a?b=C");
    }

    #[test]
    fn test_item_key_differs_per_link() {
        assert_ne!(
            ItemKey::for_item("K-Pop", "https://a.example/1"),
            ItemKey::for_item("K-Pop", "https://a.example/2")
        );
    }

    #[test]
    fn test_item_key_scoped_to_category() {
        let pop = ContentItem::new("K-Pop", "https://a/1", "t", "b", Score::ZERO, at(0)).unwrap();
        let drama =
            ContentItem::new("K-Drama", "https://a/1", "t", "b", Score::ZERO, at(0)).unwrap();
        assert_ne!(pop.key, drama.key);
        assert_eq!(pop.key, ItemKey::for_item("  k-pop", "HTTPS://A/1/"));
    }

    #[test]
    fn test_item_rejects_blank_link() {
        let result = ContentItem::new("K-Pop", "  ", "t", "b", Score::ZERO, at(0));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_observed_at_prefers_published() {
        let item = ContentItem::new("K-Pop", "https://a/1", "t", "b", Score::ZERO, at(10))
            .unwrap()
            .with_published_at(Some(at(2)));
        assert_eq!(item.observed_at(), at(2));
        assert!(item.is_stale(at(23), chrono::Duration::hours(12)));
        assert!(!item.is_stale(at(12), chrono::Duration::hours(12)));
    }

    #[test]
    fn test_blank_image_is_absent() {
        let item = ContentItem::new("K-Pop", "https://a/1", "t", "b", Score::ZERO, at(0))
            .unwrap()
            .with_image(Some("   ".to_string()));
        assert!(item.image_url.is_none());
    }
}
