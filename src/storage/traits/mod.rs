//! Storage boundary traits.
//!
//! The core depends only on these verbs; the persistence technology behind
//! them is interchangeable.

mod archive;
mod rankings;
mod repository;

pub use archive::ArchiveSink;
pub use rankings::RankingStore;
pub use repository::{ConflictKey, ContentRepository};
