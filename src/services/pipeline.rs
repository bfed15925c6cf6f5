//! One cycle over all categories.
//!
//! Per category: render the prompt, run the cascade, recover the draft list
//! (and the trending ranking when the response carries one), build and enrich
//! items, insert, maintain, archive. A failing category is logged and
//! counted; the cycle moves on.

use super::archive::ArchiveService;
use super::cooldown::SubjectCooldown;
use super::engine::Engine;
use super::enrichment::{Enricher, ImageFilter, NoopEnricher, enrich_item};
use super::ranked_store::{BoundedRankedStore, StorePolicy};
use crate::clock::{Clock, Sleeper, SystemClock, ThreadSleeper};
use crate::config::{StoreBackend, TrendvaultConfig};
use crate::llm::{ChatMessage, ExpectedShape, GenerationRequest};
use crate::models::{ContentItem, RankingEntry, RankingSnapshot, Score};
use crate::storage::memory::{InMemoryArchive, InMemoryRankings, InMemoryRepository};
use crate::storage::sqlite::{SqliteArchive, SqliteRankings, SqliteRepository};
use crate::storage::traits::{ArchiveSink, ContentRepository, RankingStore};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Prompt templates with `{category}` and `{keywords}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    /// System message template.
    pub system: String,
    /// User message template.
    pub user: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl PromptTemplates {
    /// Renders the request for `category`.
    #[must_use]
    pub fn render(&self, category: &str, keywords: &str) -> GenerationRequest {
        let fill = |template: &str| {
            template
                .replace("{category}", category)
                .replace("{keywords}", keywords)
        };
        let mut messages = Vec::with_capacity(2);
        if !self.system.trim().is_empty() {
            messages.push(ChatMessage::system(fill(&self.system)));
        }
        messages.push(ChatMessage::user(fill(&self.user)));
        GenerationRequest::new(messages)
            .with_temperature(self.temperature)
            .with_structured_output(true)
    }
}

/// Per-cycle settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Prompt templates.
    pub templates: PromptTemplates,
    /// Search keywords per category.
    pub keywords: BTreeMap<String, String>,
    /// Pause between categories.
    pub category_pause: Duration,
    /// Subject cooldown window.
    pub cooldown_ttl: chrono::Duration,
    /// Subjects remembered per category.
    pub cooldown_capacity: usize,
    /// Image URL markers that disqualify an image.
    pub bad_image_markers: Vec<String>,
}

impl PipelineSettings {
    /// Builds settings from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the cooldown window is out of range.
    pub fn from_config(config: &TrendvaultConfig) -> Result<Self> {
        let hours = i64::try_from(config.pipeline.cooldown_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| Error::InvalidInput("cooldown_hours out of range".to_string()))?;
        Ok(Self {
            templates: PromptTemplates {
                system: config.pipeline.system_prompt.clone(),
                user: config.pipeline.user_prompt.clone(),
                temperature: config.pipeline.temperature,
            },
            keywords: config.categories.keywords.clone(),
            category_pause: Duration::from_millis(config.pipeline.category_pause_ms),
            cooldown_ttl: hours,
            cooldown_capacity: config.pipeline.cooldown_capacity,
            bad_image_markers: config.store.bad_image_markers.clone(),
        })
    }
}

/// What happened to one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    /// Items were produced and stored.
    Published {
        /// Drafts stored (inserted or replaced).
        stored: usize,
        /// Drafts dropped (floor, duplicate image, cooldown, malformed).
        dropped: usize,
        /// Items evicted by maintenance.
        evicted: usize,
        /// Items written to the archive.
        archived: usize,
        /// Ranking entries stored.
        ranked: usize,
    },
    /// No content this cycle.
    Skipped {
        /// Why.
        reason: String,
    },
    /// Storage or configuration trouble; retried next cycle.
    Failed {
        /// The error.
        error: String,
    },
}

/// Report for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryReport {
    /// Category name.
    pub category: String,
    /// Outcome.
    pub outcome: CategoryOutcome,
}

/// Tally of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Categories that published.
    pub succeeded: usize,
    /// Categories with no content this cycle.
    pub skipped: usize,
    /// Categories that failed.
    pub failed: usize,
    /// Per-category detail, in run order.
    pub reports: Vec<CategoryReport>,
}

impl CycleSummary {
    fn push(&mut self, report: CategoryReport) {
        match report.outcome {
            CategoryOutcome::Published { .. } => self.succeeded += 1,
            CategoryOutcome::Skipped { .. } => self.skipped += 1,
            CategoryOutcome::Failed { .. } => self.failed += 1,
        }
        self.reports.push(report);
    }
}

/// A draft item as returned by a provider.
#[derive(Debug, Clone, Deserialize)]
struct DraftItem {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "summary", alias = "content", alias = "description")]
    body: String,
    #[serde(default, alias = "url", alias = "source_url")]
    link: String,
    #[serde(default, deserialize_with = "lenient_score")]
    score: Option<f64>,
    #[serde(default, alias = "subject", alias = "name")]
    keyword: Option<String>,
    #[serde(default, alias = "image", alias = "thumbnail")]
    image_url: Option<String>,
    #[serde(default, alias = "published", alias = "date")]
    published_at: Option<String>,
}

/// A ranking entry as returned by a provider.
#[derive(Debug, Clone, Deserialize)]
struct RankingDraft {
    #[serde(default, deserialize_with = "lenient_rank")]
    rank: Option<u32>,
    #[serde(default, alias = "display_title_en", alias = "display_title", alias = "name")]
    title: String,
    #[serde(default, alias = "search_keyword_kr", alias = "search_keyword")]
    keyword: Option<String>,
    #[serde(default, alias = "meta", alias = "reason")]
    note: Option<String>,
    #[serde(default, deserialize_with = "lenient_score")]
    score: Option<f64>,
}

/// What a provider response decodes into.
#[derive(Debug)]
struct Decoded {
    drafts: Vec<DraftItem>,
    rankings: Vec<RankingDraft>,
}

/// Accepts positive integers and numeric strings; anything else is absent.
fn lenient_rank<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let rank = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(rank.filter(|rank| *rank > 0))
}

/// Accepts numbers and numeric strings; anything else is absent.
fn lenient_score<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// The cycle driver.
pub struct Pipeline {
    engine: Engine,
    store: Arc<BoundedRankedStore>,
    archive: ArchiveService,
    rankings: Option<Arc<dyn RankingStore>>,
    enricher: Arc<dyn Enricher>,
    image_filter: ImageFilter,
    settings: PipelineSettings,
    cooldowns: Mutex<HashMap<String, Arc<SubjectCooldown>>>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl Pipeline {
    /// Creates a pipeline from prepared parts.
    #[must_use]
    pub fn new(
        engine: Engine,
        store: Arc<BoundedRankedStore>,
        archive: ArchiveService,
        settings: PipelineSettings,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let image_filter = ImageFilter::new(settings.bad_image_markers.clone());
        Self {
            engine,
            store,
            archive,
            rankings: None,
            enricher: Arc::new(NoopEnricher),
            image_filter,
            settings,
            cooldowns: Mutex::new(HashMap::new()),
            clock,
            sleeper,
        }
    }

    /// Builds a pipeline for cycle `cycle` on the system clock, with the
    /// configured storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is usable, a setting is out of range,
    /// or the storage backend cannot be opened.
    pub fn from_config(config: &TrendvaultConfig, cycle: u64) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sleeper: Arc<dyn Sleeper> = Arc::new(ThreadSleeper);
        let storage = open_storage(config)?;
        let store = Arc::new(BoundedRankedStore::new(
            StorePolicy::from_config(&config.store)?,
            storage.repository,
            Arc::clone(&clock),
        ));
        let archive = ArchiveService::new(storage.archive, Score::new(config.store.archive_threshold)?);
        let engine = Engine::from_config(config, cycle, Arc::clone(&clock), Arc::clone(&sleeper))?;
        Ok(Self::new(
            engine,
            store,
            archive,
            PipelineSettings::from_config(config)?,
            clock,
            sleeper,
        )
        .with_rankings(storage.rankings))
    }

    /// Persists the trending ranking of responses that carry one.
    #[must_use]
    pub fn with_rankings(mut self, rankings: Arc<dyn RankingStore>) -> Self {
        self.rankings = Some(rankings);
        self
    }

    /// Replaces the enricher.
    #[must_use]
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = enricher;
        self
    }

    /// The generation engine.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The live store.
    #[must_use]
    pub const fn store(&self) -> &Arc<BoundedRankedStore> {
        &self.store
    }

    /// The archive service.
    #[must_use]
    pub const fn archive(&self) -> &ArchiveService {
        &self.archive
    }

    /// Runs every category in `categories`, in order.
    pub fn run_cycle(&self, categories: &[String]) -> CycleSummary {
        let span = tracing::info_span!("pipeline.cycle", categories = categories.len());
        let _enter = span.enter();

        let mut summary = CycleSummary::default();
        for (index, category) in categories.iter().enumerate() {
            if index > 0 && !self.settings.category_pause.is_zero() {
                self.sleeper.sleep(self.settings.category_pause);
            }
            let outcome = match self.run_category(category) {
                Ok(outcome) => outcome,
                Err(e) if e.is_no_result() => {
                    tracing::warn!(category = %category, error = %e, "No content this cycle");
                    CategoryOutcome::Skipped {
                        reason: e.to_string(),
                    }
                },
                Err(e) => {
                    tracing::error!(category = %category, error = %e, "Category failed");
                    CategoryOutcome::Failed {
                        error: e.to_string(),
                    }
                },
            };
            summary.push(CategoryReport {
                category: category.clone(),
                outcome,
            });
        }

        tracing::info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            "Cycle complete"
        );
        summary
    }

    /// Runs one category.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CascadeExhausted`] or [`Error::ExtractionFailed`]
    /// when there is no content this cycle, and
    /// [`Error::StorageUnavailable`] when the store cannot be updated.
    #[tracing::instrument(skip(self), fields(provider = tracing::field::Empty, model = tracing::field::Empty))]
    pub fn run_category(&self, category: &str) -> Result<CategoryOutcome> {
        let keywords = self
            .settings
            .keywords
            .get(category)
            .map_or("", String::as_str);
        let request = self.settings.templates.render(category, keywords);
        let generated = self.engine.generate_structured(&request, ExpectedShape::Any)?;
        let span = tracing::Span::current();
        span.record("provider", generated.provider.as_str());
        span.record("model", generated.model.as_str());

        let Decoded { drafts, rankings } = decode_payload(generated.payload.into_value())?;
        let now = self.clock.now();
        let ranked = self.save_rankings(category, rankings, now)?;
        let cooldown = self.cooldown(category)?;

        let mut stored = 0;
        let mut dropped = 0;
        for draft in drafts {
            if let Some(subject) = draft.keyword.as_deref()
                && cooldown.is_cooling(subject)
            {
                tracing::debug!(category, subject, "Subject cooling down, skipping draft");
                dropped += 1;
                continue;
            }
            let Some(item) = self.build_item(category, draft, now) else {
                dropped += 1;
                continue;
            };
            let subject = item.keyword.clone();
            if self.store.insert(category, item)?.is_stored() {
                stored += 1;
                if let Some(subject) = subject {
                    cooldown.record(&subject);
                }
            } else {
                dropped += 1;
            }
        }

        let report = self.store.maintain(category)?;
        let archived = self
            .archive
            .forward(&self.store.above_score(category, self.archive.threshold())?)?;

        tracing::info!(
            category,
            stored,
            dropped,
            evicted = report.plan.len(),
            archived,
            ranked,
            size = report.size,
            "Category published"
        );
        Ok(CategoryOutcome::Published {
            stored,
            dropped,
            evicted: report.plan.len(),
            archived,
            ranked,
        })
    }

    /// Replaces the category's ranking; an empty list leaves it untouched.
    fn save_rankings(
        &self,
        category: &str,
        drafts: Vec<RankingDraft>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let Some(store) = self.rankings.as_ref() else {
            return Ok(0);
        };
        let entries: Vec<RankingEntry> = drafts
            .into_iter()
            .zip(1u32..)
            .filter_map(|(draft, position)| {
                let score = draft.score.and_then(|score| Score::new(score).ok());
                RankingEntry::new(draft.rank.unwrap_or(position), draft.title)
                    .ok()
                    .map(|entry| {
                        entry
                            .with_keyword(draft.keyword)
                            .with_note(draft.note)
                            .with_score(score)
                    })
            })
            .collect();
        if entries.is_empty() {
            return Ok(0);
        }
        let snapshot = RankingSnapshot::new(category, now, entries)?;
        store.replace_rankings(&snapshot)
    }

    fn build_item(&self, category: &str, draft: DraftItem, now: DateTime<Utc>) -> Option<ContentItem> {
        if draft.title.trim().is_empty() || draft.link.trim().is_empty() {
            tracing::debug!(category, "Dropping draft without title or link");
            return None;
        }
        let score = Score::new(draft.score.unwrap_or(0.0)).ok()?;
        let published_at = draft.published_at.as_deref().and_then(parse_timestamp);
        let item = ContentItem::new(category, draft.link.trim(), draft.title.trim(), draft.body, score, now)
            .ok()?
            .with_image(draft.image_url)
            .with_keyword(draft.keyword)
            .with_published_at(published_at);
        Some(enrich_item(item, self.enricher.as_ref(), &self.image_filter))
    }

    /// The category's cooldown, seeded from live items on first use so that
    /// subjects published by earlier runs keep cooling.
    fn cooldown(&self, category: &str) -> Result<Arc<SubjectCooldown>> {
        if let Some(existing) = self
            .cooldowns
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(category)
        {
            return Ok(Arc::clone(existing));
        }

        let cooldown = SubjectCooldown::new(
            self.settings.cooldown_capacity,
            self.settings.cooldown_ttl,
            Arc::clone(&self.clock),
        );
        let mut live = self.store.query(category)?;
        live.sort_by_key(|item| item.created_at);
        for item in &live {
            if let Some(subject) = item.keyword.as_deref() {
                cooldown.record_at(subject, item.created_at);
            }
        }
        tracing::debug!(category, subjects = cooldown.len(), "Seeded subject cooldown");

        let mut cooldowns = self
            .cooldowns
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(Arc::clone(
            cooldowns
                .entry(category.to_string())
                .or_insert_with(|| Arc::new(cooldown)),
        ))
    }
}

/// The storage backends selected by configuration.
pub struct StorageBackends {
    /// Live item repository.
    pub repository: Arc<dyn ContentRepository>,
    /// Archive sink.
    pub archive: Arc<dyn ArchiveSink>,
    /// Trending rankings.
    pub rankings: Arc<dyn RankingStore>,
}

/// Opens the configured storage backends.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the `SQLite` database cannot be
/// opened.
pub fn open_storage(config: &TrendvaultConfig) -> Result<StorageBackends> {
    match config.store.backend {
        StoreBackend::Memory => Ok(StorageBackends {
            repository: Arc::new(InMemoryRepository::new()),
            archive: Arc::new(InMemoryArchive::new()),
            rankings: Arc::new(InMemoryRankings::new()),
        }),
        StoreBackend::Sqlite => {
            let path = &config.store.db_path;
            tracing::debug!(path = %path.display(), "Opening SQLite storage");
            Ok(StorageBackends {
                repository: Arc::new(SqliteRepository::new(path)?),
                archive: Arc::new(SqliteArchive::new(path)?),
                rankings: Arc::new(SqliteRankings::new(path)?),
            })
        },
    }
}

/// Accepts a draft list as a bare array, or an object carrying an `items`
/// array, a `rankings` array, or both.
fn decode_payload(value: Value) -> Result<Decoded> {
    let (items, rankings) = match value {
        Value::Array(list) => (list, Vec::new()),
        Value::Object(mut map) => {
            let items = map.remove("items");
            let rankings = map.remove("rankings");
            match (items, rankings) {
                (Some(Value::Array(items)), Some(Value::Array(rankings))) => (items, rankings),
                (Some(Value::Array(items)), _) => (items, Vec::new()),
                (_, Some(Value::Array(rankings))) => (Vec::new(), rankings),
                _ => {
                    return Err(Error::ExtractionFailed(
                        "object payload has neither an 'items' nor a 'rankings' array".to_string(),
                    ));
                },
            }
        },
        other => {
            return Err(Error::ExtractionFailed(format!(
                "expected a list of drafts, got {other}"
            )));
        },
    };

    Ok(Decoded {
        drafts: decode_entries(items, "draft"),
        rankings: decode_entries(rankings, "ranking entry"),
    })
}

fn decode_entries<T: serde::de::DeserializeOwned>(list: Vec<Value>, kind: &str) -> Vec<T> {
    list.into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::debug!(error = %e, kind, "Skipping malformed entry");
                None
            },
        })
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|at| at.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_render_substitutes_placeholders() {
        let templates = PromptTemplates {
            system: "Editor for {category}".to_string(),
            user: "Trends in {category}: {keywords}".to_string(),
            temperature: 0.5,
        };
        let request = templates.render("K-Pop", "comeback chart");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, "Editor for K-Pop");
        assert_eq!(request.messages[1].content, "Trends in K-Pop: comeback chart");
        assert!(request.force_structured);
    }

    #[test]
    fn test_decode_payload_accepts_both_shapes() {
        let array = json!([{"title": "a", "link": "https://a/1", "score": "7.5"}]);
        let decoded = decode_payload(array).unwrap();
        assert_eq!(decoded.drafts[0].score, Some(7.5));
        assert!(decoded.rankings.is_empty());

        let object = json!({"items": [
            {"title": "b", "url": "https://b/1", "summary": "s", "score": 6},
            "not an object"
        ]});
        let drafts = decode_payload(object).unwrap().drafts;
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].link, "https://b/1");
        assert_eq!(drafts[0].body, "s");

        assert!(matches!(
            decode_payload(json!({"other": 1})),
            Err(Error::ExtractionFailed(_))
        ));
    }

    #[test]
    fn test_decode_rankings_with_provider_field_names() {
        let object = json!({
            "rankings": [
                {"rank": 1, "display_title_en": "Supernova", "search_keyword_kr": "슈퍼노바", "meta": "Chart #1", "score": 95},
                {"rank": "2", "title": "Magnetic", "score": "88"},
                {"rank": 0, "title": "How Sweet"},
                42
            ],
            "top_subject_en": "aespa"
        });
        let decoded = decode_payload(object).unwrap();
        assert!(decoded.drafts.is_empty());
        assert_eq!(decoded.rankings.len(), 3);
        assert_eq!(decoded.rankings[0].title, "Supernova");
        assert_eq!(decoded.rankings[0].keyword.as_deref(), Some("슈퍼노바"));
        assert_eq!(decoded.rankings[0].note.as_deref(), Some("Chart #1"));
        assert_eq!(decoded.rankings[1].rank, Some(2));
        assert_eq!(decoded.rankings[1].score, Some(88.0));
        assert_eq!(decoded.rankings[2].rank, None);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2026-03-01T18:00:00+09:00"), Some(expected));
        assert_eq!(
            parse_timestamp("Sun, 01 Mar 2026 09:00:00 +0000"),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp("2026-03-01"),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_summary_tally() {
        let mut summary = CycleSummary::default();
        summary.push(CategoryReport {
            category: "a".to_string(),
            outcome: CategoryOutcome::Skipped {
                reason: "x".to_string(),
            },
        });
        summary.push(CategoryReport {
            category: "b".to_string(),
            outcome: CategoryOutcome::Failed {
                error: "y".to_string(),
            },
        });
        assert_eq!((summary.succeeded, summary.skipped, summary.failed), (0, 1, 1));
    }
}
