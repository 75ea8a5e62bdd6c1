//! Cache warming for hot projections.
//!
//! Pre-loads the projections of the top-N hottest aggregates into the
//! read-through cache so the read path can serve them without touching
//! the projection store. Individual failures are logged and counted; one
//! bad key never aborts the batch.

use crate::hot_keys::HotKeyTracker;
use ledger_stream_core::cache::{CacheError, ProjectionCache};
use ledger_stream_core::clock::Clock;
use ledger_stream_core::projection::ProjectionStore;
use ledger_stream_core::stream::AggregateId;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one warming batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WarmReport {
    /// Number of projections successfully cached.
    pub warmed: usize,
    /// Number of keys that failed to load or store.
    pub failed: usize,
}

/// Pre-loads hot projections into the read-through cache.
pub struct CacheWarmer {
    hot_keys: Arc<HotKeyTracker>,
    projections: Arc<dyn ProjectionStore>,
    cache: Arc<dyn ProjectionCache>,
    clock: Arc<dyn Clock>,
}

impl CacheWarmer {
    /// Create a warmer over the given tracker, store, and cache.
    #[must_use]
    pub fn new(
        hot_keys: Arc<HotKeyTracker>,
        projections: Arc<dyn ProjectionStore>,
        cache: Arc<dyn ProjectionCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hot_keys,
            projections,
            cache,
            clock,
        }
    }

    /// Cache key for an aggregate's warmed projection.
    #[must_use]
    pub fn cache_key(aggregate_id: &AggregateId) -> String {
        format!("projection:{aggregate_id}")
    }

    /// Warm the cache with the `top_n` hottest projections.
    ///
    /// If `clear` is set, the warm-cache namespace is purged first. Each
    /// entry expires after `ttl`. Per-key load/store failures are logged
    /// and counted in the report; the batch continues.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] only if the upfront `clear` fails; per-key
    /// failures are reported, not returned.
    pub async fn warm(
        &self,
        top_n: usize,
        ttl: Duration,
        clear: bool,
    ) -> Result<WarmReport, CacheError> {
        if clear {
            self.cache.clear().await?;
            tracing::info!("Warm cache cleared");
        }

        let keys = self.hot_keys.top_n(top_n);
        let mut report = WarmReport::default();

        for aggregate_id in keys {
            match self.warm_one(&aggregate_id, ttl).await {
                Ok(()) => report.warmed += 1,
                Err(err) => {
                    report.failed += 1;
                    metrics::counter!("cache.warm_failures").increment(1);
                    tracing::warn!(
                        aggregate_id = %aggregate_id,
                        error = %err,
                        "Failed to warm projection"
                    );
                }
            }
        }

        metrics::counter!("cache.warmed").increment(report.warmed as u64);
        tracing::info!(
            warmed = report.warmed,
            failed = report.failed,
            "Cache warm batch finished"
        );
        Ok(report)
    }

    async fn warm_one(
        &self,
        aggregate_id: &AggregateId,
        ttl: Duration,
    ) -> Result<(), WarmFailure> {
        let projection = self
            .projections
            .load(aggregate_id.clone())
            .await
            .map_err(|e| WarmFailure(e.to_string()))?
            .ok_or_else(|| WarmFailure("no projection".to_string()))?;

        let bytes =
            bincode::serialize(&projection).map_err(|e| WarmFailure(e.to_string()))?;
        self.cache
            .put(&Self::cache_key(aggregate_id), bytes, ttl)
            .await
            .map_err(|e| WarmFailure(e.to_string()))?;

        // Warming counts as a read for the projection's access statistics,
        // but not for hot-key scores (the warmer must not feed its own
        // ranking).
        if let Err(err) = self
            .projections
            .record_access(aggregate_id.clone(), self.clock.now())
            .await
        {
            tracing::debug!(
                aggregate_id = %aggregate_id,
                error = %err,
                "Could not record warm access"
            );
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct WarmFailure(String);
