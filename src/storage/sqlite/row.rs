//! Row conversion for stored content items.

use crate::models::{ContentItem, ItemKey, Score};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::Row;

/// Columns selected by every item query, in [`ItemRow::from_row`] order.
pub const ITEM_COLUMNS: &str =
    "id, category, link, title, body, score, image_url, keyword, created_at, published_at";

/// Raw column values of one stored item.
#[derive(Debug)]
pub struct ItemRow {
    id: String,
    category: String,
    link: String,
    title: String,
    body: String,
    score: f64,
    image_url: Option<String>,
    keyword: Option<String>,
    created_at: i64,
    published_at: Option<i64>,
}

impl ItemRow {
    /// Reads the columns named in [`ITEM_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            category: row.get(1)?,
            link: row.get(2)?,
            title: row.get(3)?,
            body: row.get(4)?,
            score: row.get(5)?,
            image_url: row.get(6)?,
            keyword: row.get(7)?,
            created_at: row.get(8)?,
            published_at: row.get(9)?,
        })
    }

    /// Converts the row into a validated item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] for rows holding a non-finite
    /// score or an out-of-range timestamp.
    pub fn into_item(self) -> Result<ContentItem> {
        let corrupt = |cause: String| Error::StorageUnavailable {
            operation: "decode_row".to_string(),
            cause: format!("row {}: {cause}", self.id),
        };
        let score = Score::new(self.score).map_err(|e| corrupt(e.to_string()))?;
        let created_at = from_millis(self.created_at)
            .ok_or_else(|| corrupt(format!("bad created_at {}", self.created_at)))?;
        let published_at = match self.published_at {
            Some(ms) => Some(from_millis(ms).ok_or_else(|| corrupt(format!("bad published_at {ms}")))?),
            None => None,
        };

        Ok(ContentItem {
            key: ItemKey::new(self.id),
            category: self.category,
            link: self.link,
            title: self.title,
            body: self.body,
            score,
            image_url: self.image_url,
            keyword: self.keyword,
            created_at,
            published_at,
        })
    }
}

/// Milliseconds since the epoch.
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Inverse of [`to_millis`]; `None` when out of range.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}
