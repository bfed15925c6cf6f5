//! Storage layer.
//!
//! Two boundaries back the pipeline:
//! - **Repository**: the live, capped item set ([`ContentRepository`])
//! - **Archive**: durable, uncapped retention ([`ArchiveSink`])
//! - **Rankings**: the latest trending list per category ([`RankingStore`])
//!
//! Each has an in-memory implementation (default, and used by tests) and a
//! `SQLite` implementation.

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::{InMemoryArchive, InMemoryRankings, InMemoryRepository};
pub use sqlite::{SqliteArchive, SqliteRankings, SqliteRepository};
pub use traits::{ArchiveSink, ConflictKey, ContentRepository, RankingStore};
