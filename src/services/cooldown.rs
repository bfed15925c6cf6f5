//! Recently published subjects.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Remembers the subjects (trending keywords) published in one category and
/// reports those still inside their cooldown window.
///
/// Bounded by an LRU; the least recently recorded subject is forgotten first.
pub struct SubjectCooldown {
    cache: Mutex<LruCache<String, DateTime<Utc>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SubjectCooldown {
    /// Creates a cooldown tracker. A zero `capacity` is raised to one.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
        }
    }

    /// Returns true if `subject` was recorded within the cooldown window.
    #[must_use]
    pub fn is_cooling(&self, subject: &str) -> bool {
        let key = normalize_subject(subject);
        if key.is_empty() {
            return false;
        }
        let now = self.clock.now();
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match cache.peek(&key) {
            Some(recorded) if now - *recorded < self.ttl => true,
            Some(_) => {
                cache.pop(&key);
                false
            },
            None => false,
        }
    }

    /// Records `subject` as published now.
    pub fn record(&self, subject: &str) {
        self.record_at(subject, self.clock.now());
    }

    /// Records `subject` as published at `at`.
    ///
    /// An earlier timestamp never overwrites a later one, and subjects whose
    /// window has already closed are not remembered.
    pub fn record_at(&self, subject: &str, at: DateTime<Utc>) {
        let key = normalize_subject(subject);
        if key.is_empty() || self.clock.now() - at >= self.ttl {
            return;
        }
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let at = cache.peek(&key).map_or(at, |recorded| (*recorded).max(at));
        cache.put(key, at);
        #[allow(clippy::cast_precision_loss)]
        let size = cache.len() as f64;
        metrics::gauge!("cooldown_subjects").set(size);
    }

    /// Number of remembered subjects, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_subject(subject: &str) -> String {
    subject.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
