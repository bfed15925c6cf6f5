//! Cascade bookkeeping types.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// HTTP 429 or a quota-exceeded error.
    RateLimited,
    /// Timeouts, 5xx, connection resets.
    Transient,
    /// Auth failures, malformed requests, other 4xx.
    Fatal,
}

impl FailureClass {
    /// Returns the class as a metrics label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model a provider can serve, with its derived preference score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    /// Model identifier as the provider expects it.
    pub id: String,
    /// Owning provider name.
    pub provider: String,
    /// Preference score; higher is tried first.
    pub preference: f64,
}

impl ModelDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(provider: impl Into<String>, id: impl Into<String>, preference: f64) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            preference,
        }
    }
}

/// Outcome of a single cascade attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The call returned usable text.
    Success,
    /// The call failed.
    Failed {
        /// Failure classification.
        class: FailureClass,
        /// HTTP status, if one was received.
        status: Option<u16>,
        /// Provider-supplied retry-after hint.
        #[serde(skip)]
        retry_after: Option<Duration>,
        /// Error message, truncated.
        message: String,
    },
}

/// Record of one call made during a cascade.
///
/// Used for logging and diagnostics only; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeAttempt {
    /// Provider name.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// What happened.
    pub outcome: AttemptOutcome,
    /// Wall time spent in the call.
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl CascadeAttempt {
    /// Returns the failure class, or `None` for a successful attempt.
    #[must_use]
    pub const fn class(&self) -> Option<FailureClass> {
        match &self.outcome {
            AttemptOutcome::Success => None,
            AttemptOutcome::Failed { class, .. } => Some(*class),
        }
    }

    /// Returns true if the attempt succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success)
    }
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
