//! Per-run generation context.
//!
//! The [`Engine`] is built once per cycle. It owns the provider clients (each
//! bound to the credential selected for the cycle), the model catalog, the
//! cascade executor and the response sanitizer. Nothing in it is global.

use crate::clock::{Clock, Sleeper};
use crate::config::{ProviderKind, TrendvaultConfig};
use crate::llm::{
    BackoffPolicy, Candidate, CascadeExecutor, CascadeSuccess, CredentialPool, ExpectedShape,
    GeminiClient, GenerationProvider, GenerationRequest, LlmHttpConfig, ModelCatalog,
    OpenAiCompatibleClient, ResolvedModels, ResponseSanitizer, ScoringTable, StructuredPayload,
};
use crate::models::CascadeAttempt;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// One provider and its model preferences, in tier order.
#[derive(Clone)]
pub struct ProviderTier {
    /// Provider client.
    pub provider: Arc<dyn GenerationProvider>,
    /// Models used in this order when discovery is unavailable.
    pub static_models: Vec<String>,
    /// Models ranked first when discovered.
    pub preferred: Vec<String>,
}

impl ProviderTier {
    /// Creates a tier with a static fallback list.
    #[must_use]
    pub fn new(provider: Arc<dyn GenerationProvider>, static_models: Vec<String>) -> Self {
        Self {
            provider,
            static_models,
            preferred: Vec::new(),
        }
    }

    /// Sets the preferred models.
    #[must_use]
    pub fn with_preferred(mut self, preferred: Vec<String>) -> Self {
        self.preferred = preferred;
        self
    }
}

/// Resolved candidates of one tier.
#[derive(Debug, Clone)]
pub struct TierResolution {
    /// Provider name.
    pub provider: String,
    /// Ranked models and where they came from.
    pub resolved: ResolvedModels,
}

/// A recovered payload plus its provenance.
#[derive(Debug, Clone)]
pub struct Generated {
    /// The structured payload.
    pub payload: StructuredPayload,
    /// Provider that produced it.
    pub provider: String,
    /// Model that produced it.
    pub model: String,
    /// Every attempt made.
    pub attempts: Vec<CascadeAttempt>,
}

/// Generation context for one run.
pub struct Engine {
    tiers: Vec<ProviderTier>,
    catalog: ModelCatalog,
    executor: CascadeExecutor,
    sanitizer: ResponseSanitizer,
}

impl Engine {
    /// Creates an engine from prepared parts.
    #[must_use]
    pub const fn new(
        tiers: Vec<ProviderTier>,
        catalog: ModelCatalog,
        executor: CascadeExecutor,
        sanitizer: ResponseSanitizer,
    ) -> Self {
        Self {
            tiers,
            catalog,
            executor,
            sanitizer,
        }
    }

    /// Builds the engine for cycle `cycle` from configuration.
    ///
    /// Each provider's key is chosen as `keys[cycle % len]` from the
    /// environment variables it names. Providers that name variables but
    /// have none set are left out of the cascade.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no provider is usable.
    pub fn from_config(
        config: &TrendvaultConfig,
        cycle: u64,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let policy = BackoffPolicy::from_config(&config.cascade).with_env_overrides();
        let http = LlmHttpConfig {
            timeout_ms: policy.attempt_timeout_ms,
            ..LlmHttpConfig::default()
        }
        .with_env_overrides();

        let mut tiers = Vec::new();
        for provider in config.providers.iter().filter(|p| p.enabled) {
            let pool = CredentialPool::from_env_vars(&provider.api_key_env);
            if !provider.api_key_env.is_empty() && pool.is_empty() {
                tracing::warn!(
                    provider = %provider.name,
                    vars = ?provider.api_key_env,
                    "No credentials set, leaving provider out of the cascade"
                );
                continue;
            }
            let key = pool.select(cycle).cloned();
            tracing::debug!(provider = %provider.name, keys = pool.len(), cycle, "Selected credential");

            let client: Arc<dyn GenerationProvider> = match provider.kind {
                ProviderKind::OpenAi => {
                    let mut client = OpenAiCompatibleClient::new(&provider.name, &provider.base_url)
                        .with_structured_output(provider.structured_output)
                        .with_http_config(http);
                    if let Some(key) = key {
                        client = client.with_api_key(key);
                    }
                    Arc::new(client)
                },
                ProviderKind::Gemini => {
                    let mut client = GeminiClient::new(&provider.name, &provider.base_url)
                        .with_http_config(http);
                    if let Some(key) = key {
                        client = client.with_api_key(key);
                    }
                    Arc::new(client)
                },
            };
            tiers.push(
                ProviderTier::new(client, provider.models.clone())
                    .with_preferred(provider.preferred.clone()),
            );
        }

        if tiers.is_empty() {
            return Err(Error::InvalidInput(
                "no provider is enabled with credentials".to_string(),
            ));
        }

        let catalog = ModelCatalog::new(
            ScoringTable::standard(),
            Duration::from_secs(config.catalog.discovery_ttl_secs),
            Arc::clone(&clock),
        );
        let executor = CascadeExecutor::new(policy, clock, sleeper);
        Ok(Self::new(tiers, catalog, executor, ResponseSanitizer::new()))
    }

    /// Provider tiers, primary first.
    #[must_use]
    pub fn tiers(&self) -> &[ProviderTier] {
        &self.tiers
    }

    /// The model catalog.
    #[must_use]
    pub const fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// The cascade executor.
    #[must_use]
    pub const fn executor(&self) -> &CascadeExecutor {
        &self.executor
    }

    /// Resolves every tier's ranked models.
    #[must_use]
    pub fn resolve(&self) -> Vec<TierResolution> {
        self.tiers
            .iter()
            .map(|tier| TierResolution {
                provider: tier.provider.name().to_string(),
                resolved: self.catalog.resolve(
                    tier.provider.as_ref(),
                    &tier.preferred,
                    &tier.static_models,
                ),
            })
            .collect()
    }

    /// Candidates in cascade order: the primary's whole list, then the
    /// secondary's, and so on.
    #[must_use]
    pub fn candidates(&self) -> Vec<Candidate> {
        self.tiers
            .iter()
            .zip(self.resolve())
            .flat_map(|(tier, resolution)| {
                let provider = Arc::clone(&tier.provider);
                resolution
                    .resolved
                    .models
                    .into_iter()
                    .map(move |model| Candidate::new(Arc::clone(&provider), model))
            })
            .collect()
    }

    /// Runs the cascade and returns the raw response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CascadeExhausted`] if no candidate succeeds.
    pub fn generate(&self, request: &GenerationRequest) -> Result<CascadeSuccess> {
        let candidates = self.candidates();
        self.executor.execute(request, &candidates)
    }

    /// Runs the cascade and recovers a payload of `shape` from the response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CascadeExhausted`] if no candidate succeeds and
    /// [`Error::ExtractionFailed`] if the winning response holds no usable
    /// payload.
    pub fn generate_structured(
        &self,
        request: &GenerationRequest,
        shape: ExpectedShape,
    ) -> Result<Generated> {
        let success = self.generate(request)?;
        let payload = self.sanitizer.extract(&success.text, shape).inspect_err(|e| {
            tracing::warn!(
                provider = %success.provider,
                model = %success.model,
                error = %e,
                "Response held no usable payload"
            );
        })?;
        Ok(Generated {
            payload,
            provider: success.provider,
            model: success.model,
            attempts: success.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::llm::{CatalogSource, ProviderError, ScriptedProvider};
    use chrono::{TimeZone, Utc};

    fn engine(tiers: Vec<ProviderTier>) -> Engine {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        ));
        Engine::new(
            tiers,
            ModelCatalog::new(ScoringTable::standard(), Duration::ZERO, clock.clone()),
            CascadeExecutor::new(
                BackoffPolicy::default().with_jitter_ratio(0.0),
                clock.clone(),
                clock,
            ),
            ResponseSanitizer::new(),
        )
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_candidates_are_tiered() {
        let primary = ScriptedProvider::new("primary")
            .with_models(["llama-3.1-8b-instant", "llama-3.3-70b-versatile", "whisper-large-v3"]);
        let secondary = ScriptedProvider::new("secondary");
        let engine = engine(vec![
            ProviderTier::new(Arc::new(primary), strings(&["unused"])),
            ProviderTier::new(Arc::new(secondary), strings(&["s-1", "s-2"])),
        ]);

        let resolutions = engine.resolve();
        assert_eq!(resolutions[0].resolved.source, CatalogSource::Discovered);
        assert_eq!(resolutions[1].resolved.source, CatalogSource::Static);

        let order: Vec<(String, String)> = engine
            .candidates()
            .iter()
            .map(|c| (c.provider.name().to_string(), c.model.id.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("primary".to_string(), "llama-3.3-70b-versatile".to_string()),
                ("primary".to_string(), "llama-3.1-8b-instant".to_string()),
                ("secondary".to_string(), "s-1".to_string()),
                ("secondary".to_string(), "s-2".to_string()),
            ]
        );
    }

    #[test]
    fn test_generate_structured_sanitizes() {
        let provider = ScriptedProvider::new("p").script(
            "m",
            [Ok("Sure! ```json\n{\"a\":1}\n``` [1][2]".to_string())],
        );
        let engine = engine(vec![ProviderTier::new(Arc::new(provider), strings(&["m"]))]);
        let request = GenerationRequest::new(Vec::new());
        let generated = engine
            .generate_structured(&request, ExpectedShape::Object)
            .unwrap();
        assert_eq!(generated.payload.value(), &serde_json::json!({"a": 1}));
        assert_eq!(generated.provider, "p");
        assert_eq!(generated.attempts.len(), 1);
    }

    #[test]
    fn test_unusable_payload_is_extraction_failure() {
        let provider = ScriptedProvider::new("p")
            .script("m", [Ok("I cannot help with that.".to_string())]);
        let engine = engine(vec![ProviderTier::new(Arc::new(provider), strings(&["m"]))]);
        let err = engine
            .generate_structured(&GenerationRequest::new(Vec::new()), ExpectedShape::Array)
            .unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(_)));
        assert!(err.is_no_result());
    }

    #[test]
    fn test_exhaustion_propagates() {
        let provider = ScriptedProvider::new("p")
            .script("m", [Err(ProviderError::fatal("unauthorized").with_status(401))]);
        let engine = engine(vec![ProviderTier::new(Arc::new(provider), strings(&["m"]))]);
        let err = engine
            .generate(&GenerationRequest::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, Error::CascadeExhausted { ref attempts, .. } if attempts.len() == 1));
    }

    #[test]
    fn test_from_config_requires_a_provider() {
        let mut config = TrendvaultConfig::default();
        for provider in &mut config.providers {
            provider.api_key_env = vec!["TRENDVAULT_TEST_UNSET_KEY_VAR".to_string()];
        }
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let result = Engine::from_config(&config, 0, clock.clone(), clock);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_from_config_keyless_provider() {
        let mut config = TrendvaultConfig::default();
        config.providers.truncate(1);
        config.providers[0].api_key_env.clear();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = Engine::from_config(&config, 3, clock.clone(), clock).unwrap();
        assert_eq!(engine.tiers().len(), 1);
        assert_eq!(engine.tiers()[0].provider.name(), "groq");
    }
}
