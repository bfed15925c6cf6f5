//! Two-phase eviction planning.
//!
//! Phase A walks items oldest first and evicts those past the freshness
//! horizon. Phase B evicts the lowest-scoring survivors. Each phase stops as
//! soon as the excess over capacity is gone.

use crate::models::{ContentItem, ItemKey};
use chrono::{DateTime, Duration, Utc};

/// Items chosen for eviction, by phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    /// Evicted for age, oldest first.
    pub stale: Vec<ItemKey>,
    /// Evicted for score, lowest first.
    pub low_score: Vec<ItemKey>,
}

impl EvictionPlan {
    /// Total number of evictions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stale.len() + self.low_score.len()
    }

    /// Returns true if nothing is evicted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stale.is_empty() && self.low_score.is_empty()
    }

    /// All evicted keys, stale ones first.
    #[must_use]
    pub fn keys(&self) -> Vec<ItemKey> {
        self.stale.iter().chain(&self.low_score).cloned().collect()
    }
}

/// Plans the evictions that bring `items` down to `capacity`.
///
/// Returns an empty plan when `items` already fit. Ties are broken by
/// identity key so the plan is deterministic.
#[must_use]
pub fn plan_evictions(
    items: &[ContentItem],
    capacity: usize,
    now: DateTime<Utc>,
    horizon: Duration,
) -> EvictionPlan {
    let mut excess = items.len().saturating_sub(capacity);
    let mut plan = EvictionPlan::default();
    if excess == 0 {
        return plan;
    }

    let mut by_age: Vec<&ContentItem> = items.iter().collect();
    by_age.sort_by(|a, b| {
        a.observed_at()
            .cmp(&b.observed_at())
            .then_with(|| a.key.cmp(&b.key))
    });

    let mut survivors = Vec::with_capacity(by_age.len());
    for item in by_age {
        if excess > 0 && item.is_stale(now, horizon) {
            plan.stale.push(item.key.clone());
            excess -= 1;
        } else {
            survivors.push(item);
        }
    }

    if excess > 0 {
        survivors.sort_by(|a, b| {
            a.score
                .cmp(&b.score)
                .then_with(|| a.observed_at().cmp(&b.observed_at()))
                .then_with(|| a.key.cmp(&b.key))
        });
        plan.low_score
            .extend(survivors.iter().take(excess).map(|item| item.key.clone()));
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Score;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn item(link: &str, score: f64, age_hours: i64) -> ContentItem {
        ContentItem::new(
            "K-Pop",
            link,
            "t",
            "b",
            Score::new(score).unwrap(),
            now() - Duration::hours(age_hours),
        )
        .unwrap()
    }

    #[test]
    fn test_under_capacity_is_noop() {
        let items = vec![item("https://a/1", 1.0, 100)];
        assert!(plan_evictions(&items, 1, now(), Duration::hours(24)).is_empty());
    }

    #[test]
    fn test_stale_before_low_score() {
        let items = vec![
            item("https://a/old", 9.9, 48),
            item("https://a/older", 9.5, 72),
            item("https://a/low", 1.0, 1),
            item("https://a/mid", 5.0, 2),
        ];
        let plan = plan_evictions(&items, 3, now(), Duration::hours(24));
        assert_eq!(plan.stale, vec![items[1].key.clone()]);
        assert!(plan.low_score.is_empty());
    }

    #[test]
    fn test_falls_through_to_score() {
        let items = vec![
            item("https://a/stale", 9.0, 30),
            item("https://a/low", 1.0, 1),
            item("https://a/lower", 0.5, 2),
            item("https://a/high", 8.0, 3),
        ];
        let plan = plan_evictions(&items, 1, now(), Duration::hours(24));
        assert_eq!(plan.stale, vec![items[0].key.clone()]);
        assert_eq!(plan.low_score, vec![items[2].key.clone(), items[1].key.clone()]);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_published_time_drives_age() {
        let fresh_but_old_source = item("https://a/1", 9.0, 0)
            .with_published_at(Some(now() - Duration::hours(30)));
        let items = vec![fresh_but_old_source.clone(), item("https://a/2", 1.0, 1)];
        let plan = plan_evictions(&items, 1, now(), Duration::hours(24));
        assert_eq!(plan.keys(), vec![fresh_but_old_source.key]);
    }
}
