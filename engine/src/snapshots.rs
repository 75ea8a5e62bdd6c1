//! Adaptive snapshotting.
//!
//! A snapshot is due when enough events have accumulated since the last
//! one. "Enough" scales with the aggregate's temperature: hot aggregates
//! snapshot often (their replay suffix grows fastest), cold ones rarely.
//! The thresholds are policy, not protocol; any monotonic mapping works
//! as long as hot thresholds stay below cold ones.

use crate::hot_keys::{HotKeyTracker, Temperature};
use ledger_stream_core::clock::Clock;
use ledger_stream_core::projection::ProjectionRecord;
use ledger_stream_core::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use ledger_stream_core::stream::AggregateId;
use std::sync::Arc;

/// Event-count thresholds per temperature class.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotPolicy {
    /// Threshold for hot aggregates (frequent snapshots).
    pub hot_threshold: u64,
    /// Threshold for unclassified and warm aggregates.
    pub default_threshold: u64,
    /// Threshold for cold aggregates (rare snapshots).
    pub cold_threshold: u64,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            hot_threshold: 50,
            default_threshold: 100,
            cold_threshold: 500,
        }
    }
}

impl SnapshotPolicy {
    /// Threshold for the given temperature; `None` means unclassified.
    #[must_use]
    pub const fn threshold_for(&self, temperature: Option<Temperature>) -> u64 {
        match temperature {
            Some(Temperature::Hot) => self.hot_threshold,
            Some(Temperature::Cold) => self.cold_threshold,
            Some(Temperature::Warm) | None => self.default_threshold,
        }
    }
}

/// Persists point-in-time projection state to bound replay cost.
pub struct SnapshotManager {
    snapshots: Arc<dyn SnapshotStore>,
    hot_keys: Arc<HotKeyTracker>,
    clock: Arc<dyn Clock>,
    policy: SnapshotPolicy,
}

impl SnapshotManager {
    /// Create a manager with the given stores and policy.
    #[must_use]
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        hot_keys: Arc<HotKeyTracker>,
        clock: Arc<dyn Clock>,
        policy: SnapshotPolicy,
    ) -> Self {
        Self {
            snapshots,
            hot_keys,
            clock,
            policy,
        }
    }

    /// Capture a snapshot if the projection has accumulated enough events
    /// since the last one.
    ///
    /// Returns `true` if a snapshot was taken.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if reading the latest snapshot or
    /// persisting the new one fails. A corrupt latest snapshot is treated
    /// as absent: the delta is measured from version 0, which forces a
    /// fresh capture.
    pub async fn maybe_snapshot(
        &self,
        projection: &ProjectionRecord,
    ) -> Result<bool, SnapshotError> {
        let aggregate_id = projection.aggregate_id.clone();
        let base_version = match self.snapshots.latest(aggregate_id.clone()).await {
            Ok(Some(snapshot)) => snapshot.version,
            Ok(None) => ledger_stream_core::stream::Version::NONE,
            Err(SnapshotError::Corrupt { version, .. }) => {
                tracing::warn!(
                    aggregate_id = %aggregate_id,
                    version = version.value(),
                    "Latest snapshot is corrupt; measuring delta from scratch"
                );
                ledger_stream_core::stream::Version::NONE
            }
            Err(err) => return Err(err),
        };

        let delta = projection.last_event_version.since(base_version);
        let temperature = self.hot_keys.classify(&aggregate_id);
        let threshold = self.policy.threshold_for(temperature);

        if delta < threshold {
            return Ok(false);
        }

        let snapshot = Snapshot {
            aggregate_id: aggregate_id.clone(),
            version: projection.last_event_version,
            state: projection.state.clone(),
            taken_at: self.clock.now(),
        };
        self.snapshots.save(snapshot).await?;

        metrics::counter!("snapshots.taken").increment(1);
        tracing::debug!(
            aggregate_id = %aggregate_id,
            version = projection.last_event_version.value(),
            delta,
            threshold,
            temperature = ?temperature,
            "Snapshot captured"
        );
        Ok(true)
    }

    /// The most recent snapshot for the aggregate, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the store read fails or the snapshot
    /// is corrupt; callers on the rebuild path map `Corrupt` to a full
    /// replay.
    pub async fn latest(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<Snapshot>, SnapshotError> {
        self.snapshots.latest(aggregate_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_scale_with_temperature() {
        let policy = SnapshotPolicy::default();
        assert_eq!(policy.threshold_for(Some(Temperature::Hot)), 50);
        assert_eq!(policy.threshold_for(Some(Temperature::Warm)), 100);
        assert_eq!(policy.threshold_for(None), 100);
        assert_eq!(policy.threshold_for(Some(Temperature::Cold)), 500);
    }

    #[test]
    fn hot_threshold_is_strictly_below_cold() {
        let policy = SnapshotPolicy::default();
        assert!(policy.hot_threshold < policy.default_threshold);
        assert!(policy.default_threshold < policy.cold_threshold);
    }
}
