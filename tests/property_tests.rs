//! Property-based tests for store and extraction invariants.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Maintenance never leaves a category above capacity
//! - Live keys stay unique under arbitrary insert sequences
//! - Eviction removes stale items before fresh ones
//! - The sanitizer never panics and only returns the requested shape
//! - Score ordering is total

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use trendvault::clock::ManualClock;
use trendvault::llm::{ExpectedShape, ResponseSanitizer};
use trendvault::models::{ContentItem, Score};
use trendvault::services::{BoundedRankedStore, StorePolicy, plan_evictions};
use trendvault::storage::InMemoryRepository;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

/// (link index, score, age in hours)
fn draft() -> impl Strategy<Value = (u8, f64, i64)> {
    (0u8..40, 0.0f64..10.0, 0i64..72)
}

fn item((link, score, age): (u8, f64, i64)) -> ContentItem {
    ContentItem::new(
        "K-Pop",
        format!("https://news.example/{link}"),
        "t",
        "b",
        Score::new(score).unwrap(),
        start() - Duration::hours(age),
    )
    .unwrap()
}

proptest! {
    /// Property: after maintenance, size <= capacity and keys are unique.
    #[test]
    fn prop_maintain_bounds_size(
        capacity in 1usize..12,
        batches in prop::collection::vec(prop::collection::vec(draft(), 0..15), 1..4),
    ) {
        let store = BoundedRankedStore::new(
            StorePolicy::default().with_capacity(capacity),
            Arc::new(InMemoryRepository::new()),
            Arc::new(ManualClock::new(start())),
        );

        for batch in batches {
            for draft in batch {
                store.insert("K-Pop", item(draft)).unwrap();
            }
            let report = store.maintain("K-Pop").unwrap();
            prop_assert!(report.size <= capacity);

            let live = store.query("K-Pop").unwrap();
            prop_assert_eq!(live.len(), report.size);
            let keys: HashSet<_> = live.iter().map(|item| item.key.clone()).collect();
            prop_assert_eq!(keys.len(), live.len());
            prop_assert!(live.iter().all(|item| item.score >= Score::new(4.0).unwrap()));
        }
    }

    /// Property: no fresh item is evicted while a stale one survives.
    #[test]
    fn prop_stale_evicted_first(
        capacity in 1usize..10,
        drafts in prop::collection::vec(draft(), 0..30),
    ) {
        let mut seen = HashSet::new();
        let items: Vec<ContentItem> = drafts
            .into_iter()
            .filter(|(link, _, _)| seen.insert(*link))
            .map(item)
            .collect();
        let horizon = Duration::hours(24);
        let plan = plan_evictions(&items, capacity, start(), horizon);

        prop_assert_eq!(items.len() - plan.len(), items.len().min(capacity));

        let evicted: HashSet<_> = plan.keys().into_iter().collect();
        let survivors: Vec<&ContentItem> =
            items.iter().filter(|item| !evicted.contains(&item.key)).collect();
        if !plan.low_score.is_empty() {
            prop_assert!(survivors.iter().all(|item| !item.is_stale(start(), horizon)));
        }
        // Low-score evictions never outrank a fresh survivor.
        for key in &plan.low_score {
            let victim = items.iter().find(|item| &item.key == key).unwrap();
            prop_assert!(survivors.iter().all(|item| item.score >= victim.score));
        }
    }

    /// Property: the sanitizer never panics and honors the requested shape.
    #[test]
    fn prop_sanitizer_total(raw in "\\PC{0,200}", shape in 0u8..3) {
        let shape = match shape {
            0 => ExpectedShape::Object,
            1 => ExpectedShape::Array,
            _ => ExpectedShape::Any,
        };
        if let Ok(payload) = ResponseSanitizer::new().extract(&raw, shape) {
            let value = payload.value();
            match shape {
                ExpectedShape::Object => prop_assert!(value.is_object()),
                ExpectedShape::Array => prop_assert!(value.is_array()),
                ExpectedShape::Any => prop_assert!(value.is_object() || value.is_array()),
            }
        }
    }

    /// Property: a serialized object survives arbitrary prose and citations.
    #[test]
    fn prop_sanitizer_recovers_wrapped_object(
        title in "[a-zA-Z ]{1,30}",
        score in 0u8..=10,
        preamble in "[a-zA-Z .!]{0,40}",
        citations in prop::collection::vec(1u8..20, 0..4),
    ) {
        let object = serde_json::json!({"title": title, "score": score});
        let trailer: String = citations.iter().map(|n| format!(" [{n}]")).collect();
        let raw = format!("{preamble}\n```json\n{object}\n```{trailer}");
        let payload = ResponseSanitizer::new().extract(&raw, ExpectedShape::Object).unwrap();
        prop_assert_eq!(payload.value(), &object);
    }

    /// Property: score ordering agrees with f64 ordering for finite values.
    #[test]
    fn prop_score_order_total(a in -1e6f64..1e6, b in -1e6f64..1e6) {
        let (sa, sb) = (Score::new(a).unwrap(), Score::new(b).unwrap());
        prop_assert_eq!(sa.cmp(&sb), a.total_cmp(&b));
    }
}
