//! Model discovery and ranking.
//!
//! Discovered model identifiers are ranked by a [`ScoringTable`]: an ordered
//! list of regex predicates, each carrying a weight or a hard exclusion.
//! Naming conventions therefore live in data, not in branching code.

use super::{DiscoveredModel, GenerationProvider};
use crate::clock::Clock;
use crate::lazy_regex;
use crate::models::ModelDescriptor;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Numeric substrings with an optional one-letter suffix (`3.3`, `70b`, `4o`).
static VERSION_TOKEN: Lazy<Regex> = lazy_regex!(r"(\d+(?:\.\d+)?)([a-z]?)");

/// Base score for membership in the preferred list.
const PREFERRED_BASE: f64 = 1000.0;

/// Effect of a matching rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleEffect {
    /// Add this weight to the score.
    Weight(f64),
    /// Never offer the model for text generation.
    Exclude,
}

/// A predicate and its effect.
#[derive(Debug, Clone)]
pub struct ScoringRule {
    pattern: Regex,
    effect: RuleEffect,
}

impl ScoringRule {
    /// Creates a weighted rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the pattern is not a valid regex.
    pub fn weight(pattern: &str, weight: f64) -> Result<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
            effect: RuleEffect::Weight(weight),
        })
    }

    /// Creates an exclusion rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the pattern is not a valid regex.
    pub fn exclude(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
            effect: RuleEffect::Exclude,
        })
    }

    /// The rule's effect.
    #[must_use]
    pub const fn effect(&self) -> RuleEffect {
        self.effect
    }

    /// The rule's pattern source.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::InvalidInput(format!("invalid scoring pattern '{pattern}': {e}")))
}

/// Contribution of the first plausible version number in a model id.
///
/// Tokens suffixed with a size unit (`70b`, `8x7b`, `128k`, `1m`) and values
/// above `max_value` (context lengths, dates) are skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VersionRule {
    /// Score added per version unit.
    pub weight: f64,
    /// Largest value still considered a version.
    pub max_value: f64,
}

impl Default for VersionRule {
    fn default() -> Self {
        Self {
            weight: 10.0,
            max_value: 20.0,
        }
    }
}

impl VersionRule {
    /// Parses the version from a lowercased model id.
    #[must_use]
    pub fn parse(&self, id: &str) -> Option<f64> {
        VERSION_TOKEN.captures_iter(id).find_map(|caps| {
            let suffix = caps.get(2).map_or("", |m| m.as_str());
            if matches!(suffix, "b" | "k" | "m" | "x") {
                return None;
            }
            caps.get(1)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .filter(|v| *v <= self.max_value)
        })
    }
}

/// Declarative model-ranking table.
#[derive(Debug, Clone)]
pub struct ScoringTable {
    rules: Vec<ScoringRule>,
    version: Option<VersionRule>,
}

impl Default for ScoringTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ScoringTable {
    /// Creates a table from explicit rules.
    #[must_use]
    pub const fn new(rules: Vec<ScoringRule>, version: Option<VersionRule>) -> Self {
        Self { rules, version }
    }

    /// The built-in table.
    ///
    /// Excludes speech, vision, embedding and safety-classifier models, favors
    /// general-purpose families and large variants.
    #[must_use]
    pub fn standard() -> Self {
        let exclusions = [
            r"whisper",
            r"vision",
            r"guard",
            r"\btts\b|playai",
            r"audio",
            r"embed",
            r"moderation",
        ];
        let weights: [(&str, f64); 10] = [
            (r"llama", 30.0),
            (r"gemini", 30.0),
            (r"qwen|deepseek", 20.0),
            (r"mixtral|mistral", 15.0),
            (r"gemma", 10.0),
            (r"sonar", 10.0),
            (r"versatile", 15.0),
            (r"\b(70b|405b|large|pro)\b", 15.0),
            (r"\b(instant|mini|lite|8b)\b", -5.0),
            (r"preview|exp(erimental)?\b", -5.0),
        ];

        let mut rules = Vec::with_capacity(exclusions.len() + weights.len());
        rules.extend(exclusions.iter().filter_map(|p| ScoringRule::exclude(p).ok()));
        rules.extend(
            weights
                .iter()
                .filter_map(|(p, w)| ScoringRule::weight(p, *w).ok()),
        );
        Self::new(rules, Some(VersionRule::default()))
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[ScoringRule] {
        &self.rules
    }

    /// Scores a model, or returns `None` if it is excluded.
    ///
    /// Exact membership in `preferred` dominates every heuristic weight.
    #[must_use]
    pub fn score(&self, model: &DiscoveredModel, preferred: &[String]) -> Option<f64> {
        let id = model.id.to_lowercase();

        let excluded = self
            .rules
            .iter()
            .filter(|rule| rule.effect == RuleEffect::Exclude)
            .any(|rule| {
                rule.pattern.is_match(&id) || model.tags.iter().any(|t| rule.pattern.is_match(t))
            });
        if excluded {
            return None;
        }

        if let Some(index) = preferred.iter().position(|p| p.eq_ignore_ascii_case(&model.id)) {
            #[allow(clippy::cast_precision_loss)]
            let rank = (preferred.len() - index) as f64;
            return Some(rank.mul_add(10.0, PREFERRED_BASE));
        }

        let mut score: f64 = self
            .rules
            .iter()
            .filter_map(|rule| match rule.effect {
                RuleEffect::Weight(weight) if rule.pattern.is_match(&id) => Some(weight),
                _ => None,
            })
            .sum();

        if let Some(version) = self.version
            && let Some(value) = version.parse(&id)
        {
            score += value * version.weight;
        }
        Some(score)
    }

    /// Ranks discovered models, highest score first.
    ///
    /// Excluded models are dropped. Ties keep catalog order.
    #[must_use]
    pub fn rank(
        &self,
        provider: &str,
        models: &[DiscoveredModel],
        preferred: &[String],
    ) -> Vec<ModelDescriptor> {
        let mut ranked: Vec<ModelDescriptor> = models
            .iter()
            .filter_map(|model| {
                self.score(model, preferred)
                    .map(|score| ModelDescriptor::new(provider, model.id.clone(), score))
            })
            .collect();
        ranked.sort_by(|a, b| b.preference.total_cmp(&a.preference));
        ranked
    }
}

/// Where a resolved model list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    /// Live discovery.
    Discovered,
    /// A cached discovery within its TTL.
    Cached,
    /// The configured static list.
    Static,
}

impl CatalogSource {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Cached => "cached",
            Self::Static => "static",
        }
    }
}

/// Ranked candidates for one provider.
#[derive(Debug, Clone)]
pub struct ResolvedModels {
    /// Models, best first.
    pub models: Vec<ModelDescriptor>,
    /// Provenance of the list.
    pub source: CatalogSource,
}

struct CachedListing {
    fetched_at: DateTime<Utc>,
    models: Vec<DiscoveredModel>,
}

/// Discovers and ranks models per provider.
pub struct ModelCatalog {
    table: ScoringTable,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<String, CachedListing>>,
}

impl ModelCatalog {
    /// Creates a catalog. A zero `ttl` disables caching.
    #[must_use]
    pub fn new(table: ScoringTable, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            table,
            ttl,
            clock,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The scoring table in use.
    #[must_use]
    pub const fn table(&self) -> &ScoringTable {
        &self.table
    }

    /// Discovers and ranks the provider's callable models.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryUnavailable`] if the listing fails or nothing
    /// survives the exclusion rules.
    #[tracing::instrument(skip_all, fields(provider = provider.name()))]
    pub fn discover(
        &self,
        provider: &dyn GenerationProvider,
        preferred: &[String],
    ) -> Result<(Vec<ModelDescriptor>, CatalogSource)> {
        let name = provider.name();
        let (listing, source) = match self.cached(name) {
            Some(listing) => (listing, CatalogSource::Cached),
            None => {
                let listing = provider.list_models()?;
                self.store(name, &listing);
                (listing, CatalogSource::Discovered)
            },
        };

        let ranked = self.table.rank(name, &listing, preferred);
        if ranked.is_empty() {
            return Err(Error::DiscoveryUnavailable {
                provider: name.to_string(),
                cause: format!("all {} listed models excluded", listing.len()),
            });
        }
        Ok((ranked, source))
    }

    /// Resolves the candidate list, falling back to `static_models` when
    /// discovery is unavailable.
    ///
    /// The static list is used in configured order.
    pub fn resolve(
        &self,
        provider: &dyn GenerationProvider,
        preferred: &[String],
        static_models: &[String],
    ) -> ResolvedModels {
        let name = provider.name();
        match self.discover(provider, preferred) {
            Ok((models, source)) => {
                metrics::counter!(
                    "catalog_discovery_total",
                    "provider" => name.to_string(),
                    "status" => source.as_str()
                )
                .increment(1);
                tracing::debug!(
                    provider = name,
                    count = models.len(),
                    source = source.as_str(),
                    "Resolved models"
                );
                ResolvedModels { models, source }
            },
            Err(err) => {
                metrics::counter!(
                    "catalog_discovery_total",
                    "provider" => name.to_string(),
                    "status" => "fallback"
                )
                .increment(1);
                tracing::warn!(
                    provider = name,
                    error = %err,
                    fallback = static_models.len(),
                    "Model discovery unavailable, using static list"
                );
                ResolvedModels {
                    models: static_list(name, static_models),
                    source: CatalogSource::Static,
                }
            },
        }
    }

    /// Drops any cached listing for `provider`.
    pub fn invalidate(&self, provider: &str) {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(provider);
    }

    fn cached(&self, provider: &str) -> Option<Vec<DiscoveredModel>> {
        if self.ttl.is_zero() {
            return None;
        }
        let ttl = chrono::Duration::from_std(self.ttl).ok()?;
        let now = self.clock.now();
        let cache = self
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        cache
            .get(provider)
            .filter(|entry| now - entry.fetched_at < ttl)
            .map(|entry| entry.models.clone())
    }

    fn store(&self, provider: &str, models: &[DiscoveredModel]) {
        if self.ttl.is_zero() {
            return;
        }
        let entry = CachedListing {
            fetched_at: self.clock.now(),
            models: models.to_vec(),
        };
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(provider.to_string(), entry);
    }
}

/// Builds descriptors for a static list, preserving its order.
fn static_list(provider: &str, models: &[String]) -> Vec<ModelDescriptor> {
    let len = models.len();
    models
        .iter()
        .enumerate()
        .map(|(index, id)| {
            #[allow(clippy::cast_precision_loss)]
            let preference = (len - index) as f64;
            ModelDescriptor::new(provider, id.clone(), preference)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::llm::{GenerationRequest, ProviderError};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ListingProvider {
        models: Option<Vec<&'static str>>,
        calls: AtomicUsize,
    }

    impl ListingProvider {
        fn new(models: Option<Vec<&'static str>>) -> Self {
            Self {
                models,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl GenerationProvider for ListingProvider {
        fn name(&self) -> &str {
            "groq"
        }

        fn supports_structured_output(&self) -> bool {
            true
        }

        fn generate(
            &self,
            _model: &str,
            _request: &GenerationRequest,
            _timeout: Duration,
        ) -> std::result::Result<String, ProviderError> {
            Err(ProviderError::fatal("unused"))
        }

        fn list_models(&self) -> Result<Vec<DiscoveredModel>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.models
                .as_ref()
                .map(|ids| ids.iter().map(|id| DiscoveredModel::new(*id)).collect())
                .ok_or_else(|| Error::DiscoveryUnavailable {
                    provider: "groq".to_string(),
                    cause: "401".to_string(),
                })
        }
    }

    fn ids(models: &[ModelDescriptor]) -> Vec<&str> {
        models.iter().map(|m| m.id.as_str()).collect()
    }

    fn catalog(ttl: Duration) -> (ModelCatalog, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        ));
        (
            ModelCatalog::new(ScoringTable::standard(), ttl, clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_exclusions_are_hard() {
        let table = ScoringTable::standard();
        for id in [
            "whisper-large-v3",
            "llama-guard-4-12b",
            "llama-3.2-90b-vision-preview",
            "playai-tts",
            "meta-llama/llama-prompt-guard-2-86m",
        ] {
            assert_eq!(table.score(&DiscoveredModel::new(id), &[]), None, "{id}");
        }
    }

    #[test]
    fn test_exclusion_beats_preference() {
        let table = ScoringTable::standard();
        let preferred = vec!["whisper-large-v3".to_string()];
        assert_eq!(
            table.score(&DiscoveredModel::new("whisper-large-v3"), &preferred),
            None
        );
    }

    #[test]
    fn test_exclusion_by_tag() {
        let table = ScoringTable::standard();
        let model = DiscoveredModel {
            id: "mystery-1".to_string(),
            tags: vec!["audio".to_string()],
        };
        assert_eq!(table.score(&model, &[]), None);
    }

    #[test]
    fn test_preferred_dominates() {
        let table = ScoringTable::standard();
        let preferred = vec!["gemma2-9b-it".to_string()];
        let models: Vec<DiscoveredModel> = ["llama-3.3-70b-versatile", "gemma2-9b-it"]
            .into_iter()
            .map(DiscoveredModel::new)
            .collect();
        let ranked = table.rank("groq", &models, &preferred);
        assert_eq!(ids(&ranked), ["gemma2-9b-it", "llama-3.3-70b-versatile"]);
    }

    #[test]
    fn test_heuristic_order() {
        let table = ScoringTable::standard();
        let models: Vec<DiscoveredModel> = [
            "gemma2-9b-it",
            "llama-3.1-8b-instant",
            "llama-3.3-70b-versatile",
            "mixtral-8x7b-32768",
        ]
        .into_iter()
        .map(DiscoveredModel::new)
        .collect();
        let ranked = table.rank("groq", &models, &[]);
        assert_eq!(ranked[0].id, "llama-3.3-70b-versatile");
        assert_eq!(ranked.last().unwrap().id, "mixtral-8x7b-32768");
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let table = ScoringTable::new(Vec::new(), None);
        let models: Vec<DiscoveredModel> = ["b", "a", "c"].into_iter().map(DiscoveredModel::new).collect();
        assert_eq!(ids(&table.rank("p", &models, &[])), ["b", "a", "c"]);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let table = ScoringTable::standard();
        let models: Vec<DiscoveredModel> = [
            "qwen-2.5-32b",
            "deepseek-r1-distill-llama-70b",
            "llama3-70b-8192",
            "gemini-2.0-flash",
        ]
        .into_iter()
        .map(DiscoveredModel::new)
        .collect();
        assert_eq!(
            table.rank("p", &models, &[]),
            table.rank("p", &models, &[])
        );
    }

    #[test]
    fn test_version_parse() {
        let rule = VersionRule::default();
        assert_eq!(rule.parse("llama-3.3-70b-versatile"), Some(3.3));
        assert_eq!(rule.parse("gemini-1.5-pro-002"), Some(1.5));
        assert_eq!(rule.parse("mixtral-8x7b-32768"), None);
        assert_eq!(rule.parse("gemma2-9b-it"), Some(2.0));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(matches!(
            ScoringRule::weight("(unclosed", 1.0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_resolve_falls_back_to_static_order() {
        let (catalog, _) = catalog(Duration::ZERO);
        let provider = ListingProvider::new(None);
        let statics = vec![
            "llama-3.1-70b-versatile".to_string(),
            "llama-3.3-70b-versatile".to_string(),
        ];
        let resolved = catalog.resolve(&provider, &[], &statics);
        assert_eq!(resolved.source, CatalogSource::Static);
        assert_eq!(
            ids(&resolved.models),
            ["llama-3.1-70b-versatile", "llama-3.3-70b-versatile"]
        );
    }

    #[test]
    fn test_all_excluded_falls_back() {
        let (catalog, _) = catalog(Duration::ZERO);
        let provider = ListingProvider::new(Some(vec!["whisper-large-v3"]));
        let resolved = catalog.resolve(&provider, &[], &["fallback".to_string()]);
        assert_eq!(resolved.source, CatalogSource::Static);
        assert_eq!(ids(&resolved.models), ["fallback"]);
    }

    #[test]
    fn test_cache_honors_ttl() {
        let (catalog, clock) = catalog(Duration::from_secs(600));
        let provider = ListingProvider::new(Some(vec!["llama-3.3-70b-versatile"]));

        assert_eq!(
            catalog.resolve(&provider, &[], &[]).source,
            CatalogSource::Discovered
        );
        assert_eq!(
            catalog.resolve(&provider, &[], &[]).source,
            CatalogSource::Cached
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(601));
        assert_eq!(
            catalog.resolve(&provider, &[], &[]).source,
            CatalogSource::Discovered
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let (catalog, _) = catalog(Duration::ZERO);
        let provider = ListingProvider::new(Some(vec!["llama-3.3-70b-versatile"]));
        catalog.resolve(&provider, &[], &[]);
        catalog.resolve(&provider, &[], &[]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
