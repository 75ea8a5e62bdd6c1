//! Hot-key tracking: ranked access counters per aggregate.
//!
//! Every successful projection access or fold bumps an aggregate's score.
//! Scores are monotonic, with no decay; the scoring is private to this
//! module so a decay policy can be added without touching callers.
//! Rankings feed two policies:
//!
//! - the snapshot manager picks thresholds by temperature
//! - the cache warmer picks the top-N aggregates to preload
//!
//! Concurrent increments are commutative atomic adds on a sharded map;
//! no external locking is required.

use dashmap::DashMap;
use ledger_stream_core::stream::AggregateId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Access temperature of an aggregate, relative to the population.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Temperature {
    /// Top decile by access score.
    Hot,
    /// Top half, below the top decile.
    Warm,
    /// Bottom half.
    Cold,
}

/// Ranked, commutatively-updated access counter per aggregate.
///
/// # Examples
///
/// ```
/// use ledger_stream_engine::hot_keys::HotKeyTracker;
/// use ledger_stream_core::stream::AggregateId;
///
/// let tracker = HotKeyTracker::new();
/// let key = AggregateId::new("acct-1");
/// tracker.record_access(&key);
/// tracker.record_access(&key);
/// assert_eq!(tracker.score(&key), 2);
/// assert_eq!(tracker.top_n(1), vec![key]);
/// ```
#[derive(Debug, Default)]
pub struct HotKeyTracker {
    scores: DashMap<AggregateId, AtomicU64>,
}

impl HotKeyTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scores: DashMap::new(),
        }
    }

    /// Increase the aggregate's score by one.
    ///
    /// Safe to call from any number of workers concurrently; increments
    /// commute.
    pub fn record_access(&self, key: &AggregateId) {
        if let Some(counter) = self.scores.get(key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.scores
            .entry(key.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current score for a key; 0 if never recorded.
    #[must_use]
    pub fn score(&self, key: &AggregateId) -> u64 {
        self.scores
            .get(key)
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether no key has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Up to `n` keys with the highest scores, descending.
    ///
    /// Ties break by ascending key ordering so the result is reproducible.
    #[must_use]
    pub fn top_n(&self, n: usize) -> Vec<AggregateId> {
        let mut ranked = self.ranked();
        ranked.truncate(n);
        ranked.into_iter().map(|(key, _)| key).collect()
    }

    /// Classify a key's temperature relative to the tracked population.
    ///
    /// Top decile is hot, top half is warm, the rest is cold. Returns
    /// `None` for keys that have never been recorded; callers apply their
    /// default policy to those.
    #[must_use]
    pub fn classify(&self, key: &AggregateId) -> Option<Temperature> {
        let ranked = self.ranked();
        let population = ranked.len();
        let rank = ranked.iter().position(|(candidate, _)| candidate == key)?;

        let hot_cutoff = population.div_ceil(10);
        let warm_cutoff = population.div_ceil(2);
        if rank < hot_cutoff {
            Some(Temperature::Hot)
        } else if rank < warm_cutoff {
            Some(Temperature::Warm)
        } else {
            Some(Temperature::Cold)
        }
    }

    fn ranked(&self) -> Vec<(AggregateId, u64)> {
        let mut entries: Vec<(AggregateId, u64)> = self
            .scores
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        entries.sort_by(|(key_a, score_a), (key_b, score_b)| {
            score_b.cmp(score_a).then_with(|| key_a.cmp(key_b))
        });
        entries
    }
}
