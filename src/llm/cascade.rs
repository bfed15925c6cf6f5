//! Ordered fallback across (provider, model) candidates.

use super::backoff::{BackoffPolicy, RateLimitPolicy};
use super::{GenerationProvider, GenerationRequest, ProviderError, truncate_message};
use crate::clock::{Clock, Sleeper};
use crate::models::{AttemptOutcome, CascadeAttempt, FailureClass, ModelDescriptor};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const MAX_ATTEMPT_MESSAGE_CHARS: usize = 200;

/// A single (provider, model) pair eligible for one attempt.
#[derive(Clone)]
pub struct Candidate {
    /// Provider client.
    pub provider: Arc<dyn GenerationProvider>,
    /// Model to request.
    pub model: ModelDescriptor,
}

impl Candidate {
    /// Creates a candidate.
    #[must_use]
    pub fn new(provider: Arc<dyn GenerationProvider>, model: ModelDescriptor) -> Self {
        Self { provider, model }
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("provider", &self.provider.name())
            .field("model", &self.model.id)
            .finish()
    }
}

/// Result of a successful cascade.
#[derive(Debug, Clone)]
pub struct CascadeSuccess {
    /// Raw response text.
    pub text: String,
    /// Provider that produced it.
    pub provider: String,
    /// Model that produced it.
    pub model: String,
    /// Every attempt made, the successful one last.
    pub attempts: Vec<CascadeAttempt>,
}

/// Tries candidates in order until one succeeds.
///
/// Fatal failures advance immediately. Transient failures retry the same
/// candidate up to the policy bound with jittered backoff. Rate limits either
/// advance (retrying once after the list is exhausted) or wait and retry in
/// place, per [`RateLimitPolicy`]. The whole cascade is bounded by a hard
/// deadline measured on the injected clock.
pub struct CascadeExecutor {
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

/// Per-run bookkeeping.
struct Run<'a> {
    request: &'a GenerationRequest,
    deadline: DateTime<Utc>,
    attempts: Vec<CascadeAttempt>,
    deadline_cut: bool,
}

enum Step {
    Done(CascadeSuccess),
    Failed(ProviderError),
    OutOfTime,
}

impl CascadeExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(policy: BackoffPolicy, clock: Arc<dyn Clock>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            policy,
            clock,
            sleeper,
        }
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Executes `request` against `candidates` in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CascadeExhausted`] with the full attempt log when no
    /// candidate succeeds within the deadline.
    pub fn execute(
        &self,
        request: &GenerationRequest,
        candidates: &[Candidate],
    ) -> Result<CascadeSuccess> {
        let span = tracing::info_span!(
            "cascade.execute",
            candidates = candidates.len(),
            policy = self.policy.rate_limit_policy.as_str(),
            status = tracing::field::Empty,
            attempts = tracing::field::Empty
        );
        let _enter = span.enter();

        let mut run = Run {
            request,
            deadline: shift(self.clock.now(), self.policy.deadline()),
            attempts: Vec::new(),
            deadline_cut: false,
        };

        let result = self.run(&mut run, candidates);
        let status = match &result {
            Ok(_) => "success",
            Err(Error::CascadeExhausted {
                deadline_exceeded: true,
                ..
            }) => "deadline",
            Err(_) => "exhausted",
        };
        span.record("status", status);
        span.record("attempts", run_len(&result));
        metrics::counter!("cascade_outcomes_total", "status" => status).increment(1);
        result
    }

    fn run(&self, run: &mut Run<'_>, candidates: &[Candidate]) -> Result<CascadeSuccess> {
        let mut deferred: Vec<(&Candidate, Option<Duration>)> = Vec::new();

        for candidate in candidates {
            match self.try_candidate(run, candidate) {
                Step::Done(success) => return Ok(success),
                Step::OutOfTime => return Err(exhausted(run, true)),
                Step::Failed(err) => {
                    if err.class == FailureClass::RateLimited
                        && self.policy.rate_limit_policy == RateLimitPolicy::Advance
                    {
                        deferred.push((candidate, err.retry_after));
                    }
                },
            }
        }

        if self.policy.retry_rate_limited_after_exhaustion && !deferred.is_empty() {
            tracing::info!(
                count = deferred.len(),
                "All candidates tried, retrying rate-limited ones"
            );
            for (candidate, retry_after) in deferred {
                if !self.pause(run, self.policy.rate_limit_delay(retry_after)) {
                    continue;
                }
                match self.attempt(run, candidate) {
                    Step::Done(success) => return Ok(success),
                    Step::OutOfTime => return Err(exhausted(run, true)),
                    Step::Failed(_) => {},
                }
            }
        }

        let deadline_cut = run.deadline_cut;
        Err(exhausted(run, deadline_cut))
    }

    /// Attempts one candidate, including in-place retries.
    fn try_candidate(&self, run: &mut Run<'_>, candidate: &Candidate) -> Step {
        let mut transient_retries = 0;
        let mut waited_for_rate_limit = false;

        loop {
            let err = match self.attempt(run, candidate) {
                Step::Failed(err) => err,
                done_or_out => return done_or_out,
            };

            let wait = match err.class {
                FailureClass::Fatal => None,
                FailureClass::Transient
                    if transient_retries < self.policy.max_transient_retries =>
                {
                    transient_retries += 1;
                    Some(self.policy.transient_delay(transient_retries))
                },
                FailureClass::Transient => None,
                FailureClass::RateLimited
                    if self.policy.rate_limit_policy == RateLimitPolicy::WaitAndRetry
                        && !waited_for_rate_limit =>
                {
                    waited_for_rate_limit = true;
                    Some(self.policy.rate_limit_delay(err.retry_after))
                },
                FailureClass::RateLimited => None,
            };

            match wait {
                Some(delay) if self.pause(run, delay) => {},
                _ => return Step::Failed(err),
            }
        }
    }

    /// Issues one call and records it.
    fn attempt(&self, run: &mut Run<'_>, candidate: &Candidate) -> Step {
        let Some(remaining) = self.remaining(run.deadline) else {
            return Step::OutOfTime;
        };
        let timeout = self.policy.attempt_timeout().min(remaining);
        let provider = candidate.provider.name().to_string();
        let model = candidate.model.id.clone();

        let span = tracing::debug_span!(
            "cascade.attempt",
            provider = %provider,
            model = %model,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            class = tracing::field::Empty
        );
        let _enter = span.enter();

        let started = self.clock.now();
        let result = candidate
            .provider
            .generate(&model, run.request, timeout);
        let elapsed = (self.clock.now() - started).to_std().unwrap_or_default();

        let class_label = result
            .as_ref()
            .err()
            .map_or("success", |err| err.class.as_str());
        span.record("class", class_label);
        metrics::counter!(
            "cascade_attempts_total",
            "provider" => provider.clone(),
            "class" => class_label
        )
        .increment(1);
        #[allow(clippy::cast_precision_loss)]
        let elapsed_ms = elapsed.as_millis() as f64;
        metrics::histogram!("cascade_attempt_duration_ms", "provider" => provider.clone())
            .record(elapsed_ms);

        match result {
            Ok(text) => {
                run.attempts.push(CascadeAttempt {
                    provider: provider.clone(),
                    model: model.clone(),
                    outcome: AttemptOutcome::Success,
                    elapsed,
                });
                tracing::info!(
                    provider = %provider,
                    model = %model,
                    attempts = run.attempts.len(),
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Cascade succeeded"
                );
                Step::Done(CascadeSuccess {
                    text,
                    provider,
                    model,
                    attempts: std::mem::take(&mut run.attempts),
                })
            },
            Err(err) => {
                tracing::warn!(
                    provider = %provider,
                    model = %model,
                    class = %err.class,
                    status = ?err.status,
                    "Provider attempt failed: {}",
                    err.message
                );
                run.attempts.push(CascadeAttempt {
                    provider,
                    model,
                    outcome: AttemptOutcome::Failed {
                        class: err.class,
                        status: err.status,
                        retry_after: err.retry_after,
                        message: truncate_message(&err.message, MAX_ATTEMPT_MESSAGE_CHARS),
                    },
                    elapsed,
                });
                Step::Failed(err)
            },
        }
    }

    /// Sleeps for `delay` unless that would overrun the deadline.
    ///
    /// Returns false (without sleeping) when the wait does not fit.
    fn pause(&self, run: &mut Run<'_>, delay: Duration) -> bool {
        let fits = self
            .remaining(run.deadline)
            .is_some_and(|remaining| delay < remaining);
        if !fits {
            run.deadline_cut = true;
            tracing::debug!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Skipping wait that would exceed the cascade deadline"
            );
            return false;
        }
        #[allow(clippy::cast_precision_loss)]
        let delay_ms = delay.as_millis() as f64;
        metrics::histogram!("cascade_backoff_ms").record(delay_ms);
        self.sleeper.sleep(delay);
        true
    }

    fn remaining(&self, deadline: DateTime<Utc>) -> Option<Duration> {
        (deadline - self.clock.now())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }
}

fn shift(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn exhausted(run: &mut Run<'_>, deadline_exceeded: bool) -> Error {
    tracing::warn!(
        attempts = run.attempts.len(),
        deadline_exceeded,
        "Cascade exhausted"
    );
    Error::CascadeExhausted {
        attempts: std::mem::take(&mut run.attempts),
        deadline_exceeded,
    }
}

fn run_len(result: &Result<CascadeSuccess>) -> usize {
    match result {
        Ok(success) => success.attempts.len(),
        Err(Error::CascadeExhausted { attempts, .. }) => attempts.len(),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::llm::{ChatMessage, ScriptedProvider};
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        ))
    }

    fn executor(policy: BackoffPolicy, clock: &Arc<ManualClock>) -> CascadeExecutor {
        CascadeExecutor::new(policy.with_jitter_ratio(0.0), clock.clone(), clock.clone())
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(vec![ChatMessage::user("trends")])
    }

    fn candidates(provider: &Arc<ScriptedProvider>, models: &[&str]) -> Vec<Candidate> {
        models
            .iter()
            .map(|m| {
                Candidate::new(
                    provider.clone(),
                    ModelDescriptor::new(provider.name(), *m, 0.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_short_circuits_on_success() {
        let clock = clock();
        let provider = Arc::new(
            ScriptedProvider::new("a")
                .script("m1", [Err(ProviderError::fatal("bad key"))])
                .script("m2", [Ok("ok".to_string())])
                .script("m3", [Ok("never".to_string())]),
        );
        let success = executor(BackoffPolicy::default(), &clock)
            .execute(&request(), &candidates(&provider, &["m1", "m2", "m3"]))
            .unwrap();
        assert_eq!(success.text, "ok");
        assert_eq!(success.model, "m2");
        assert_eq!(provider.calls(), ["m1", "m2"]);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_transient_retries_then_advances() {
        let clock = clock();
        let provider = Arc::new(
            ScriptedProvider::new("a")
                .script(
                    "m1",
                    [
                        Err(ProviderError::transient("reset")),
                        Err(ProviderError::transient("reset")),
                        Err(ProviderError::transient("reset")),
                    ],
                )
                .script("m2", [Ok("ok".to_string())]),
        );
        let policy = BackoffPolicy::default().with_max_transient_retries(2);
        let success = executor(policy, &clock)
            .execute(&request(), &candidates(&provider, &["m1", "m2"]))
            .unwrap();
        assert_eq!(provider.calls(), ["m1", "m1", "m1", "m2"]);
        assert_eq!(success.attempts.len(), 4);
        assert_eq!(
            clock.sleeps(),
            [Duration::from_millis(500), Duration::from_millis(1_000)]
        );
    }

    #[test]
    fn test_fatal_does_not_back_off() {
        let clock = clock();
        let provider = Arc::new(
            ScriptedProvider::new("a")
                .script("m1", [Err(ProviderError::fatal("401").with_status(401))])
                .script("m2", [Err(ProviderError::fatal("400").with_status(400))]),
        );
        let err = executor(BackoffPolicy::default(), &clock)
            .execute(&request(), &candidates(&provider, &["m1", "m2"]))
            .unwrap_err();
        match err {
            Error::CascadeExhausted {
                attempts,
                deadline_exceeded,
            } => {
                assert_eq!(attempts.len(), 2);
                assert!(!deadline_exceeded);
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_wait_policy_retries_same_candidate() {
        let clock = clock();
        let provider = Arc::new(
            ScriptedProvider::new("a")
                .script(
                    "m1",
                    [
                        Err(ProviderError::rate_limited(Some(Duration::from_secs(5)), "429")),
                        Ok("ok".to_string()),
                    ],
                )
                .script("m2", [Ok("unused".to_string())]),
        );
        let policy = BackoffPolicy::default().with_rate_limit_policy(RateLimitPolicy::WaitAndRetry);
        let success = executor(policy, &clock)
            .execute(&request(), &candidates(&provider, &["m1", "m2"]))
            .unwrap();
        assert_eq!(success.model, "m1");
        assert_eq!(provider.calls(), ["m1", "m1"]);
        assert_eq!(clock.sleeps(), [Duration::from_secs(5)]);
    }

    #[test]
    fn test_advance_policy_moves_on_without_sleeping() {
        let clock = clock();
        let provider = Arc::new(
            ScriptedProvider::new("a")
                .script(
                    "m1",
                    [Err(ProviderError::rate_limited(Some(Duration::from_secs(5)), "429"))],
                )
                .script("m2", [Ok("ok".to_string())]),
        );
        let success = executor(BackoffPolicy::default(), &clock)
            .execute(&request(), &candidates(&provider, &["m1", "m2"]))
            .unwrap();
        assert_eq!(success.model, "m2");
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_advance_retries_rate_limited_after_exhaustion() {
        let clock = clock();
        let provider = Arc::new(
            ScriptedProvider::new("a")
                .script(
                    "m1",
                    [
                        Err(ProviderError::rate_limited(Some(Duration::from_secs(7)), "429")),
                        Ok("late".to_string()),
                    ],
                )
                .script("m2", [Err(ProviderError::fatal("gone"))]),
        );
        let success = executor(BackoffPolicy::default(), &clock)
            .execute(&request(), &candidates(&provider, &["m1", "m2"]))
            .unwrap();
        assert_eq!(success.text, "late");
        assert_eq!(provider.calls(), ["m1", "m2", "m1"]);
        assert_eq!(clock.sleeps(), [Duration::from_secs(7)]);
    }

    #[test]
    fn test_deadline_skips_long_waits() {
        let clock = clock();
        let provider = Arc::new(ScriptedProvider::new("a").script(
            "m1",
            [Err(ProviderError::rate_limited(Some(Duration::from_secs(300)), "429"))],
        ));
        let err = executor(BackoffPolicy::default(), &clock)
            .execute(&request(), &candidates(&provider, &["m1"]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CascadeExhausted {
                deadline_exceeded: true,
                ..
            }
        ));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_deadline_stops_attempts() {
        let clock = clock();
        let provider = Arc::new(
            ScriptedProvider::new("a")
                .script("m1", [Err(ProviderError::fatal("x"))])
                .script("m2", [Ok("too late".to_string())])
                .with_call_latency(clock.clone(), Duration::from_secs(90)),
        );
        let err = executor(BackoffPolicy::default().with_deadline_ms(60_000), &clock)
            .execute(&request(), &candidates(&provider, &["m1", "m2"]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CascadeExhausted {
                deadline_exceeded: true,
                ..
            }
        ));
        assert_eq!(provider.calls(), ["m1"]);
    }

    #[test]
    fn test_empty_candidates_exhaust() {
        let clock = clock();
        let err = executor(BackoffPolicy::default(), &clock)
            .execute(&request(), &[])
            .unwrap_err();
        assert!(err.is_no_result());
    }
}
