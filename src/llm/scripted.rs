//! Deterministic provider double.
//!
//! Replays a per-model script of results and records every call, so cascade
//! behavior can be asserted without network access.

use super::{DiscoveredModel, GenerationProvider, GenerationRequest, ProviderError};
use crate::clock::ManualClock;
use crate::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Script = VecDeque<std::result::Result<String, ProviderError>>;

/// A provider that replays scripted results.
///
/// Models with an exhausted or missing script fail fatally.
pub struct ScriptedProvider {
    name: String,
    listing: Option<Vec<String>>,
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    latency: Option<(Arc<ManualClock>, Duration)>,
}

impl ScriptedProvider {
    /// Creates a provider whose discovery is unavailable.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listing: None,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// Makes discovery return these model ids.
    #[must_use]
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.listing = Some(models.into_iter().map(Into::into).collect());
        self
    }

    /// Appends results for `model`, consumed in order.
    #[must_use]
    pub fn script<I>(self, model: &str, results: I) -> Self
    where
        I: IntoIterator<Item = std::result::Result<String, ProviderError>>,
    {
        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(model.to_string())
            .or_default()
            .extend(results);
        self
    }

    /// Advances `clock` by `latency` on every call.
    #[must_use]
    pub fn with_call_latency(mut self, clock: Arc<ManualClock>, latency: Duration) -> Self {
        self.latency = Some((clock, latency));
        self
    }

    /// Models called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    fn generate(
        &self,
        model: &str,
        _request: &GenerationRequest,
        _timeout: Duration,
    ) -> std::result::Result<String, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(model.to_string());

        if let Some((clock, latency)) = &self.latency {
            clock.advance(*latency);
        }

        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(model)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ProviderError::fatal(format!("no scripted result for {model}"))))
    }

    fn list_models(&self) -> Result<Vec<DiscoveredModel>> {
        self.listing
            .as_ref()
            .map(|ids| ids.iter().map(DiscoveredModel::new).collect())
            .ok_or_else(|| Error::DiscoveryUnavailable {
                provider: self.name.clone(),
                cause: "discovery not scripted".to_string(),
            })
    }
}
