//! Failure classification for provider responses.
//!
//! Maps HTTP statuses, error bodies and transport errors onto
//! [`FailureClass`], and recovers machine-readable retry-after hints.

use super::{ProviderError, truncate_message};
use crate::lazy_regex;
use crate::models::FailureClass;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

/// Gemini's `"retryDelay": "5s"` field inside `RetryInfo` details.
static RETRY_DELAY_FIELD: Lazy<Regex> =
    lazy_regex!(r#""retryDelay"\s*:\s*"(\d+(?:\.\d+)?)s""#);

/// OpenAI-style "Please try again in 1m5.2s" / "in 350ms" phrasing.
static TRY_AGAIN_IN: Lazy<Regex> =
    lazy_regex!(r"(?i)try again in\s+(?:(\d+)m(?:in)?\s*)?(\d+(?:\.\d+)?)(ms|s)\b");

/// Quota exhaustion reported with a non-429 status.
static QUOTA_MARKER: Lazy<Regex> =
    lazy_regex!(r"(?i)resource[_ ]exhausted|quota exceeded|rate[_ ]limit(?:ed| exceeded| reached)");

const MAX_MESSAGE_CHARS: usize = 300;

/// Longest retry-after hint honored; larger hints are clamped to this.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// Classifies an HTTP status code.
///
/// 429 is a rate limit; 408, 425 and every 5xx are transient; any other
/// non-success status is fatal for the candidate.
#[must_use]
pub const fn classify_status(status: u16) -> FailureClass {
    match status {
        429 => FailureClass::RateLimited,
        408 | 425 | 500..=599 => FailureClass::Transient,
        _ => FailureClass::Fatal,
    }
}

/// Extracts a retry-after duration.
///
/// The `Retry-After` header (delta seconds) wins; otherwise the error body is
/// searched for a `retryDelay` field or "try again in" phrasing. HTTP-date
/// header values are ignored. Hints are capped at [`MAX_RETRY_AFTER`].
#[must_use]
pub fn parse_retry_after(header: Option<&str>, body: &str) -> Option<Duration> {
    if let Some(seconds) = header.and_then(|h| h.trim().parse::<f64>().ok()) {
        return seconds_to_duration(seconds);
    }

    if let Some(caps) = RETRY_DELAY_FIELD.captures(body) {
        return caps
            .get(1)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .and_then(seconds_to_duration);
    }

    let caps = TRY_AGAIN_IN.captures(body)?;
    let minutes = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0);
    let amount = caps.get(2)?.as_str().parse::<f64>().ok()?;
    let seconds = match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(unit) if unit == "ms" => amount / 1000.0,
        _ => amount,
    };
    seconds_to_duration(minutes.mul_add(60.0, seconds))
}

fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    if seconds >= MAX_RETRY_AFTER.as_secs_f64() {
        return Some(MAX_RETRY_AFTER);
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// Builds a [`ProviderError`] from a non-success response.
///
/// A quota marker in the body upgrades a fatal status (some upstreams report
/// exhausted quota as 403) to a rate limit.
#[must_use]
pub fn from_response(status: u16, retry_after_header: Option<&str>, body: &str) -> ProviderError {
    let mut class = classify_status(status);
    if class == FailureClass::Fatal && QUOTA_MARKER.is_match(body) {
        class = FailureClass::RateLimited;
    }

    let retry_after = if class == FailureClass::Fatal {
        None
    } else {
        parse_retry_after(retry_after_header, body)
    };

    ProviderError {
        class,
        status: Some(status),
        retry_after,
        message: truncate_message(body.trim(), MAX_MESSAGE_CHARS),
    }
}

/// Builds a [`ProviderError`] from a transport-level failure.
///
/// Timeouts, connect failures and dropped connections are transient; a
/// request that could not even be built is fatal.
#[must_use]
pub fn from_transport(err: &reqwest::Error) -> ProviderError {
    let message = truncate_message(&err.to_string(), MAX_MESSAGE_CHARS);
    if err.is_builder() {
        ProviderError::fatal(message)
    } else {
        ProviderError::transient(message)
    }
}
