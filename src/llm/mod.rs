//! Text-generation provider layer.
//!
//! Provides a unified interface over independent providers, plus the pieces
//! that make calls to them survivable: model discovery and ranking, the
//! cascade executor with its backoff policy, and payload recovery from noisy
//! responses.

mod backoff;
mod cascade;
mod catalog;
mod classify;
mod credentials;
mod gemini;
mod openai_compat;
mod sanitizer;
mod scripted;

pub use backoff::{BackoffPolicy, RateLimitPolicy};
pub use cascade::{Candidate, CascadeExecutor, CascadeSuccess};
pub use catalog::{
    CatalogSource, ModelCatalog, ResolvedModels, RuleEffect, ScoringRule, ScoringTable, VersionRule,
};
pub use classify::{MAX_RETRY_AFTER, classify_status, parse_retry_after};
pub use credentials::CredentialPool;
pub use gemini::GeminiClient;
pub use openai_compat::OpenAiCompatibleClient;
pub use sanitizer::{ExpectedShape, ResponseSanitizer, StructuredPayload};
pub use scripted::ScriptedProvider;

pub use crate::models::FailureClass;

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Trait for text-generation providers.
///
/// Implementations translate a [`GenerationRequest`] into one HTTP call and
/// report failures as classified [`ProviderError`] values, never panics.
pub trait GenerationProvider: Send + Sync {
    /// The provider name, unique within a configuration.
    fn name(&self) -> &str;

    /// Whether the provider can be asked to emit structured (JSON) output.
    fn supports_structured_output(&self) -> bool;

    /// Generates a completion with the given model.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ProviderError`] if the call fails or the
    /// response carries no text.
    fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError>;

    /// Lists the models currently callable with this provider's credential.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DiscoveryUnavailable`] if the listing cannot be
    /// fetched. Callers fall back to a static list.
    fn list_models(&self) -> Result<Vec<DiscoveredModel>>;
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User content.
    User,
    /// Prior assistant output.
    Assistant,
}

impl Role {
    /// Returns the wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message in a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A provider-independent generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Ordered messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Ask the provider for structured output when it supports it.
    pub force_structured: bool,
    /// Optional completion token limit.
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Creates a request from messages with temperature 0.3.
    #[must_use]
    pub const fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.3,
            force_structured: false,
            max_tokens: None,
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Requests structured output.
    #[must_use]
    pub const fn with_structured_output(mut self, force: bool) -> Self {
        self.force_structured = force;
        self
    }

    /// Sets the completion token limit.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A model returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredModel {
    /// Model identifier.
    pub id: String,
    /// Capability tags reported by the provider, if any.
    pub tags: Vec<String>,
}

impl DiscoveredModel {
    /// Creates an untagged model entry.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: Vec::new(),
        }
    }
}

/// A classified provider failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Failure classification.
    pub class: FailureClass,
    /// HTTP status, if a response was received.
    pub status: Option<u16>,
    /// Machine-readable retry-after hint.
    pub retry_after: Option<Duration>,
    /// Human-readable cause.
    pub message: String,
}

impl ProviderError {
    /// Creates a rate-limit failure.
    #[must_use]
    pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::RateLimited,
            status: Some(429),
            retry_after,
            message: message.into(),
        }
    }

    /// Creates a transient failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// Creates a fatal failure.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Fatal,
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// Attaches an HTTP status.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status}): {}", self.class, self.message),
            None => write!(f, "{}: {}", self.class, self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// HTTP client configuration for providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Default per-attempt request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(timeout_ms) = env_u64("TRENDVAULT_ATTEMPT_TIMEOUT_MS") {
            self.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = env_u64("TRENDVAULT_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = connect_timeout_ms;
        }
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok())
}

/// Builds a blocking HTTP client with the configured connect timeout.
///
/// Request timeouts are set per call so the cascade can shrink them to fit
/// its remaining deadline.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build provider HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Truncates a provider message for logs and attempt records.
pub(crate) fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}
