//! Data models.

mod cascade;
mod content;
mod ranking;

pub use cascade::{AttemptOutcome, CascadeAttempt, FailureClass, ModelDescriptor};
pub use content::{ContentItem, ItemKey, Score, normalize_category, normalize_link};
pub use ranking::{MAX_RANKINGS, RankingEntry, RankingSnapshot};
