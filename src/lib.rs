//! # Trendvault
//!
//! Provider-cascade content pipeline with a bounded, ranked per-category store.
//!
//! Trendvault asks unreliable text-generation providers for structured content,
//! recovers the payload from whatever prose the provider wrapped around it, and
//! keeps a fixed-capacity, deduplicated set of live items per category. Items
//! scoring above a threshold are copied into an uncapped archive.
//!
//! ## Features
//!
//! - Tiered provider cascade with live model discovery and static fallback
//! - Declarative model-ranking table (regex predicate to weight)
//! - Rate-limit aware backoff with a hard per-cascade deadline
//! - Noise-tolerant JSON extraction (fences, citations, control characters)
//! - Two-phase eviction: stale items first, then lowest score
//! - Pluggable storage (in-memory, `SQLite`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use trendvault::config::TrendvaultConfig;
//! use trendvault::services::Pipeline;
//!
//! let config = TrendvaultConfig::load_default();
//! let pipeline = Pipeline::from_config(&config, 0)?;
//! let summary = pipeline.run_cycle(&config.categories.order);
//! println!("{} categories published", summary.succeeded);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

/// Builds a lazily compiled static regex from a literal pattern.
///
/// Patterns are compile-time literals covered by tests, so a compile failure
/// is unreachable in practice.
macro_rules! lazy_regex {
    ($pattern:expr) => {
        once_cell::sync::Lazy::new(|| regex::Regex::new($pattern).unwrap_or_else(|_| unreachable!()))
    };
}
pub(crate) use lazy_regex;

// Module declarations
pub mod clock;
pub mod config;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, Sleeper, SystemClock, ThreadSleeper};
pub use config::TrendvaultConfig;
pub use llm::{
    CascadeExecutor, FailureClass, GenerationProvider, GenerationRequest, ModelCatalog,
    ProviderError, ResponseSanitizer,
};
pub use models::{CascadeAttempt, ContentItem, ItemKey, ModelDescriptor, Score};
pub use services::{BoundedRankedStore, Engine, Pipeline};
pub use storage::{ArchiveSink, ContentRepository};

/// Error type for trendvault operations.
///
/// Every variant resolves to "skip this unit of work"; none of them is meant
/// to terminate the host process.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed config values, NaN scores, empty category keys |
/// | `OperationFailed` | I/O errors, HTTP client failures outside a cascade |
/// | `DiscoveryUnavailable` | A provider's model list cannot be fetched or is empty |
/// | `CascadeExhausted` | Every candidate failed or the cascade deadline passed |
/// | `ExtractionFailed` | No structured payload could be recovered from a response |
/// | `StorageUnavailable` | The storage collaborator rejected or could not serve a call |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A configuration value cannot be parsed
    /// - A score is NaN or infinite
    /// - A category key or link is empty
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Config files cannot be read or parsed
    /// - Observability components fail to initialize
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Model discovery could not be performed.
    ///
    /// Raised when:
    /// - The provider's model listing endpoint is unreachable
    /// - Authentication for the listing fails
    /// - The listing is empty after filtering
    ///
    /// Callers fall back to the provider's static model list.
    #[error("model discovery unavailable for '{provider}': {cause}")]
    DiscoveryUnavailable {
        /// Provider name.
        provider: String,
        /// The underlying cause.
        cause: String,
    },

    /// Every cascade candidate failed.
    ///
    /// Raised when:
    /// - All (provider, model) candidates returned errors
    /// - The hard cascade deadline was reached
    /// - No candidates were available at all
    #[error("cascade exhausted after {} attempts{}", attempts.len(), if *deadline_exceeded { " (deadline exceeded)" } else { "" })]
    CascadeExhausted {
        /// Every attempt made, in order.
        attempts: Vec<models::CascadeAttempt>,
        /// Whether the hard deadline cut the cascade short.
        deadline_exceeded: bool,
    },

    /// No structured payload could be recovered from a response.
    ///
    /// Raised when:
    /// - The response has no balanced delimiter span of the expected shape
    /// - The span fails to parse even after the repair pass
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// The storage collaborator could not complete a call.
    ///
    /// Raised when:
    /// - `SQLite` statements fail
    /// - A repository double is configured to fail
    ///
    /// In-memory store state is left untouched; the work is retried next cycle.
    #[error("storage unavailable during '{operation}': {cause}")]
    StorageUnavailable {
        /// The storage verb that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns true if the error means "no content this cycle" rather than a
    /// configuration or programming problem.
    #[must_use]
    pub const fn is_no_result(&self) -> bool {
        matches!(
            self,
            Self::CascadeExhausted { .. } | Self::ExtractionFailed(_)
        )
    }
}

/// Result type alias for trendvault operations.
pub type Result<T> = std::result::Result<T, Error>;
