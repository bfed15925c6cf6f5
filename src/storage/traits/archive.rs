//! Archive sink trait.

use crate::Result;
use crate::models::ContentItem;

/// Durable, uncapped destination for high-value items.
///
/// Receives independent copies; nothing links an archived row back to the
/// live store. Writes are idempotent on the item's source link.
pub trait ArchiveSink: Send + Sync {
    /// Archives copies of `items`, returning the number written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the write fails.
    fn archive(&self, items: &[ContentItem]) -> Result<usize>;

    /// Number of archived items.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the count fails.
    fn count(&self) -> Result<usize>;
}
