//! Backoff policy for the provider cascade.

use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What to do when a candidate is rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitPolicy {
    /// Move to the next candidate immediately. Rate-limited candidates get one
    /// waited retry only after every candidate has been tried once.
    #[default]
    Advance,
    /// Sleep for the retry-after interval, then retry the same candidate once.
    #[serde(rename = "wait")]
    WaitAndRetry,
}

impl RateLimitPolicy {
    /// Config spelling of the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::WaitAndRetry => "wait",
        }
    }
}

impl fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateLimitPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advance" | "skip" => Ok(Self::Advance),
            "wait" | "wait_and_retry" | "retry" => Ok(Self::WaitAndRetry),
            other => Err(Error::InvalidInput(format!(
                "unknown rate limit policy '{other}' (expected 'advance' or 'wait')"
            ))),
        }
    }
}

/// Retry, backoff and deadline settings for one cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Rate-limit handling.
    pub rate_limit_policy: RateLimitPolicy,
    /// Retries of the same candidate after a transient failure.
    pub max_transient_retries: u32,
    /// First transient backoff in milliseconds; doubles per retry.
    pub base_delay_ms: u64,
    /// Cap on a single transient backoff in milliseconds.
    pub max_delay_ms: u64,
    /// Rate-limit wait when the provider gives no retry-after hint.
    pub rate_limit_default_ms: u64,
    /// Upper jitter bound as a fraction of the computed delay.
    pub jitter_ratio: f64,
    /// Hard ceiling for the whole cascade in milliseconds.
    pub deadline_ms: u64,
    /// Per-attempt request timeout in milliseconds.
    pub attempt_timeout_ms: u64,
    /// Under [`RateLimitPolicy::Advance`], retry rate-limited candidates once
    /// after the list is exhausted.
    pub retry_rate_limited_after_exhaustion: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit_policy: RateLimitPolicy::Advance,
            max_transient_retries: 1,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            rate_limit_default_ms: 5_000,
            jitter_ratio: 0.2,
            deadline_ms: 120_000,
            attempt_timeout_ms: 60_000,
            retry_rate_limited_after_exhaustion: true,
        }
    }
}

impl BackoffPolicy {
    /// Loads the policy from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads the policy from config file settings.
    #[must_use]
    pub fn from_config(config: &crate::config::CascadeConfig) -> Self {
        let mut policy = Self::default();
        if let Some(policy_name) = config.rate_limit_policy.as_deref() {
            match policy_name.parse() {
                Ok(parsed) => policy.rate_limit_policy = parsed,
                Err(e) => tracing::warn!("Ignoring cascade.rate_limit_policy: {e}"),
            }
        }
        if let Some(retries) = config.max_transient_retries {
            policy.max_transient_retries = retries;
        }
        if let Some(base) = config.base_delay_ms {
            policy.base_delay_ms = base;
        }
        if let Some(max) = config.max_delay_ms {
            policy.max_delay_ms = max;
        }
        if let Some(default_ms) = config.rate_limit_default_ms {
            policy.rate_limit_default_ms = default_ms;
        }
        if let Some(ratio) = config.jitter_ratio {
            policy.jitter_ratio = ratio.clamp(0.0, 1.0);
        }
        if let Some(deadline) = config.deadline_ms {
            policy.deadline_ms = deadline.max(1);
        }
        if let Some(timeout) = config.attempt_timeout_ms {
            policy.attempt_timeout_ms = timeout.max(1);
        }
        if let Some(flag) = config.retry_rate_limited_after_exhaustion {
            policy.retry_rate_limited_after_exhaustion = flag;
        }
        policy
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("TRENDVAULT_RATE_LIMIT_POLICY") {
            match v.parse() {
                Ok(parsed) => self.rate_limit_policy = parsed,
                Err(e) => tracing::warn!("Ignoring TRENDVAULT_RATE_LIMIT_POLICY: {e}"),
            }
        }
        if let Ok(v) = std::env::var("TRENDVAULT_MAX_TRANSIENT_RETRIES")
            && let Ok(parsed) = v.parse::<u32>()
        {
            self.max_transient_retries = parsed;
        }
        if let Ok(v) = std::env::var("TRENDVAULT_BACKOFF_BASE_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.base_delay_ms = parsed;
        }
        if let Ok(v) = std::env::var("TRENDVAULT_CASCADE_DEADLINE_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.deadline_ms = parsed.max(1);
        }
        if let Ok(v) = std::env::var("TRENDVAULT_ATTEMPT_TIMEOUT_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.attempt_timeout_ms = parsed.max(1);
        }
        self
    }

    /// Sets the rate-limit policy.
    #[must_use]
    pub const fn with_rate_limit_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit_policy = policy;
        self
    }

    /// Sets the transient retry bound.
    #[must_use]
    pub const fn with_max_transient_retries(mut self, retries: u32) -> Self {
        self.max_transient_retries = retries;
        self
    }

    /// Sets the jitter ratio (clamped to `0.0..=1.0`).
    #[must_use]
    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Sets the hard cascade deadline.
    #[must_use]
    pub const fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = deadline_ms;
        self
    }

    /// The hard cascade deadline.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// The per-attempt request timeout.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Backoff before transient retry number `retry` (1-based).
    #[must_use]
    pub fn transient_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let delay = self
            .base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_ms);
        self.jittered(Duration::from_millis(delay))
    }

    /// Wait before retrying a rate-limited candidate.
    ///
    /// Never shorter than the provider's `retry_after` hint.
    #[must_use]
    pub fn rate_limit_delay(&self, retry_after: Option<Duration>) -> Duration {
        let floor =
            retry_after.unwrap_or_else(|| Duration::from_millis(self.rate_limit_default_ms));
        self.jittered(floor)
    }

    /// Adds `[0, jitter_ratio * delay]` of random jitter, saturating at
    /// [`Duration::MAX`].
    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter_ratio;
        let extra = rand::thread_rng().gen_range(0.0..=spread);
        delay.saturating_add(Duration::try_from_secs_f64(extra).unwrap_or(Duration::MAX))
    }
}
