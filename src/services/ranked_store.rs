//! Bounded, ranked, deduplicated per-category store.
//!
//! The in-memory view is authoritative for reads. Every mutation is written
//! to the [`ContentRepository`] first; when the repository fails, the
//! in-memory view is left untouched and the error is returned, so the next
//! cycle retries against a consistent state.

use super::eviction::{EvictionPlan, plan_evictions};
use crate::clock::Clock;
use crate::models::{ContentItem, ItemKey, Score};
use crate::storage::traits::{ConflictKey, ContentRepository};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

/// Capacity, quality floor and dedup settings.
#[derive(Debug, Clone)]
pub struct StorePolicy {
    /// Maximum items per category after maintenance.
    pub capacity: usize,
    /// Items observed longer ago than this are evicted first.
    pub freshness: chrono::Duration,
    /// Inserts scoring below this are dropped.
    pub min_score: Score,
    /// Image URLs containing any of these are exempt from image dedup.
    pub placeholder_markers: Vec<String>,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            capacity: crate::config::DEFAULT_CAPACITY,
            freshness: chrono::Duration::hours(24),
            min_score: Score::new(4.0).unwrap_or(Score::ZERO),
            placeholder_markers: vec!["placehold.co".to_string()],
        }
    }
}

impl StorePolicy {
    /// Builds the policy from store settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero capacity, a non-finite
    /// floor, or a freshness horizon out of range.
    pub fn from_config(config: &crate::config::StoreConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(Error::InvalidInput("store capacity must be positive".to_string()));
        }
        let hours = i64::try_from(config.freshness_hours)
            .map_err(|_| Error::InvalidInput("freshness_hours out of range".to_string()))?;
        let freshness = chrono::Duration::try_hours(hours)
            .ok_or_else(|| Error::InvalidInput("freshness_hours out of range".to_string()))?;
        Ok(Self {
            capacity: config.capacity,
            freshness,
            min_score: Score::new(config.min_score)?,
            placeholder_markers: config.placeholder_markers.clone(),
        })
    }

    /// Sets the capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the quality floor.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: Score) -> Self {
        self.min_score = min_score;
        self
    }

    /// Sets the freshness horizon.
    #[must_use]
    pub const fn with_freshness(mut self, freshness: chrono::Duration) -> Self {
        self.freshness = freshness;
        self
    }

    fn is_placeholder(&self, image_url: &str) -> bool {
        self.placeholder_markers
            .iter()
            .any(|marker| image_url.contains(marker.as_str()))
    }
}

/// What an insert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new identity key was added.
    Inserted,
    /// An existing item was replaced in place.
    Replaced,
    /// Dropped: score under the quality floor.
    BelowFloor,
    /// Dropped: another live item already uses the same image.
    DuplicateImage,
}

impl InsertOutcome {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced => "replaced",
            Self::BelowFloor => "below_floor",
            Self::DuplicateImage => "duplicate_image",
        }
    }

    /// Returns true if the item is now live.
    #[must_use]
    pub const fn is_stored(self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced)
    }
}

/// Result of a maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Keys evicted in each phase.
    pub plan: EvictionPlan,
    /// Live items after the pass.
    pub size: usize,
}

#[derive(Debug, Default)]
struct CategoryState {
    items: HashMap<ItemKey, ContentItem>,
    loaded: bool,
}

/// Per-category capacity-limited item sets.
///
/// Categories are independently locked; callers may drive different
/// categories from different threads.
pub struct BoundedRankedStore {
    policy: StorePolicy,
    repository: Arc<dyn ContentRepository>,
    clock: Arc<dyn Clock>,
    categories: Mutex<HashMap<String, Arc<Mutex<CategoryState>>>>,
}

impl BoundedRankedStore {
    /// Creates a store backed by `repository`.
    #[must_use]
    pub fn new(
        policy: StorePolicy,
        repository: Arc<dyn ContentRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy,
            repository,
            clock,
            categories: Mutex::new(HashMap::new()),
        }
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &StorePolicy {
        &self.policy
    }

    /// The backing repository.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn ContentRepository> {
        &self.repository
    }

    /// Upserts `item` into `category`.
    ///
    /// Items under the quality floor, and items whose non-placeholder image is
    /// already used by a different live item, are dropped without error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty category or an item filed
    /// under another category, and [`Error::StorageUnavailable`] if the
    /// repository write fails (the in-memory view is unchanged).
    #[instrument(skip(self, item), fields(category = %category, key = %item.key, score = %item.score))]
    pub fn insert(&self, category: &str, item: ContentItem) -> Result<InsertOutcome> {
        validate_category(category)?;
        if item.category != category {
            return Err(Error::InvalidInput(format!(
                "item filed under '{}' inserted into '{category}'",
                item.category
            )));
        }

        if item.score < self.policy.min_score {
            return Ok(record_insert(InsertOutcome::BelowFloor));
        }

        let cell = self.category(category);
        let mut state = lock(&cell);
        self.ensure_loaded(category, &mut state)?;

        if let Some(image) = item.image_url.as_deref()
            && !self.policy.is_placeholder(image)
            && state
                .items
                .values()
                .any(|live| live.key != item.key && live.image_url.as_deref() == Some(image))
        {
            tracing::debug!(image, "Dropping item with duplicate image");
            return Ok(record_insert(InsertOutcome::DuplicateImage));
        }

        self.repository
            .upsert(std::slice::from_ref(&item), ConflictKey::Identity)?;

        let outcome = match state.items.insert(item.key.clone(), item) {
            Some(_) => InsertOutcome::Replaced,
            None => InsertOutcome::Inserted,
        };
        record_size(category, state.items.len());
        Ok(record_insert(outcome))
    }

    /// Restores `size <= capacity` for `category`.
    ///
    /// Does nothing unless the category is over capacity. Stale items go
    /// first, oldest first; then the lowest scores.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the repository delete fails
    /// (the in-memory view is unchanged).
    #[instrument(skip(self), fields(category = %category, evicted = tracing::field::Empty))]
    pub fn maintain(&self, category: &str) -> Result<MaintenanceReport> {
        validate_category(category)?;
        let cell = self.category(category);
        let mut state = lock(&cell);
        self.ensure_loaded(category, &mut state)?;

        if state.items.len() <= self.policy.capacity {
            return Ok(MaintenanceReport {
                plan: EvictionPlan::default(),
                size: state.items.len(),
            });
        }

        let items: Vec<ContentItem> = state.items.values().cloned().collect();
        let plan = plan_evictions(
            &items,
            self.policy.capacity,
            self.clock.now(),
            self.policy.freshness,
        );

        self.repository.delete_by_ids(&plan.keys())?;

        for key in plan.keys() {
            state.items.remove(&key);
        }
        metrics::counter!("store_evictions_total", "phase" => "stale")
            .increment(plan.stale.len() as u64);
        metrics::counter!("store_evictions_total", "phase" => "low_score")
            .increment(plan.low_score.len() as u64);
        record_size(category, state.items.len());
        tracing::Span::current().record("evicted", plan.len());
        tracing::info!(
            category,
            stale = plan.stale.len(),
            low_score = plan.low_score.len(),
            size = state.items.len(),
            "Maintenance evicted items"
        );

        Ok(MaintenanceReport {
            size: state.items.len(),
            plan,
        })
    }

    /// Live items in `category`, highest score first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the category has not been
    /// loaded yet and the repository read fails.
    pub fn query(&self, category: &str) -> Result<Vec<ContentItem>> {
        validate_category(category)?;
        let cell = self.category(category);
        let mut state = lock(&cell);
        self.ensure_loaded(category, &mut state)?;
        let mut items: Vec<ContentItem> = state.items.values().cloned().collect();
        drop(state);
        items.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.observed_at().cmp(&a.observed_at()))
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(items)
    }

    /// Live items in `category` scoring at or above `threshold`, highest
    /// first.
    ///
    /// # Errors
    ///
    /// Same as [`Self::query`].
    pub fn above_score(&self, category: &str, threshold: Score) -> Result<Vec<ContentItem>> {
        let mut items = self.query(category)?;
        items.retain(|item| item.score >= threshold);
        Ok(items)
    }

    /// Number of live items in `category`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::query`].
    pub fn len(&self, category: &str) -> Result<usize> {
        validate_category(category)?;
        let cell = self.category(category);
        let mut state = lock(&cell);
        self.ensure_loaded(category, &mut state)?;
        Ok(state.items.len())
    }

    /// Reloads `category` from the repository, replacing the in-memory view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the read fails; the current
    /// view is kept.
    pub fn reload(&self, category: &str) -> Result<usize> {
        validate_category(category)?;
        let cell = self.category(category);
        let mut state = lock(&cell);
        state.loaded = false;
        let result = self.ensure_loaded(category, &mut state);
        if result.is_err() {
            state.loaded = true;
        }
        result.map(|()| state.items.len())
    }

    fn category(&self, category: &str) -> Arc<Mutex<CategoryState>> {
        let mut categories = lock(&self.categories);
        Arc::clone(categories.entry(category.to_string()).or_default())
    }

    fn ensure_loaded(&self, category: &str, state: &mut CategoryState) -> Result<()> {
        if state.loaded {
            return Ok(());
        }
        let rows = self.repository.select_by_category(category)?;
        state.items = rows
            .into_iter()
            .map(|item| (item.key.clone(), item))
            .collect();
        state.loaded = true;
        tracing::debug!(category, count = state.items.len(), "Loaded category");
        Ok(())
    }
}

fn validate_category(category: &str) -> Result<()> {
    if category.trim().is_empty() {
        return Err(Error::InvalidInput("category must not be empty".to_string()));
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Store mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn record_insert(outcome: InsertOutcome) -> InsertOutcome {
    metrics::counter!("store_inserts_total", "outcome" => outcome.as_str()).increment(1);
    outcome
}

fn record_size(category: &str, size: usize) {
    #[allow(clippy::cast_precision_loss)]
    let size = size as f64;
    metrics::gauge!("store_size", "category" => category.to_string()).set(size);
}
