//! The live projection update path.
//!
//! `ProjectionUpdater::apply` folds one event into its aggregate's
//! projection under optimistic concurrency control:
//!
//! 1. load the projection (or start an empty one)
//! 2. skip events at or below `last_event_version` (idempotency)
//! 3. defer events that skip ahead (the pipeline redelivers them)
//! 4. fold the event through the pure [`ProjectionFold`]
//! 5. write back conditioned on the unchanged `VersionToken`, retrying
//!    lost races per the [`RetryPolicy`]
//! 6. on success, bump the hot-key score and let the snapshot manager
//!    decide whether a capture is due
//!
//! A write that loses every retry surfaces as
//! [`UpdaterError::PersistentConflict`]; the caller requeues the event,
//! it is never dropped.

use crate::hot_keys::HotKeyTracker;
use crate::retry::RetryPolicy;
use crate::snapshots::SnapshotManager;
use ledger_stream_core::event::EventRecord;
use ledger_stream_core::projection::{
    ProjectionError, ProjectionFold, ProjectionRecord, ProjectionStore,
};
use ledger_stream_core::stream::{AggregateId, Version};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;

/// Errors from the live update path.
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// The CAS write lost every configured retry.
    ///
    /// The event must be requeued for later redelivery; idempotency makes
    /// the redelivery safe.
    #[error("Persistent conflict applying version {version} to {aggregate_id}")]
    PersistentConflict {
        /// The contended aggregate.
        aggregate_id: AggregateId,
        /// The event version that could not be applied.
        version: Version,
    },

    /// Projection storage or fold failure.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// Result of applying one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event was folded in and the projection written.
    Applied,
    /// The projection was already at or past this version; nothing written.
    AlreadyApplied,
    /// The event skips ahead of the projection; apply it again after the
    /// missing versions arrive.
    Deferred {
        /// The only version the projection can fold next.
        expected: Version,
    },
}

/// One pass through the load → check → fold → write sequence.
enum Step {
    Applied(ProjectionRecord),
    AlreadyApplied,
    Deferred(Version),
}

/// Consumes newly appended events and applies them to projections.
pub struct ProjectionUpdater<F: ProjectionFold> {
    projections: Arc<dyn ProjectionStore>,
    snapshots: Arc<SnapshotManager>,
    hot_keys: Arc<HotKeyTracker>,
    fold: F,
    retry: RetryPolicy,
}

impl<F: ProjectionFold> ProjectionUpdater<F> {
    /// Create an updater.
    ///
    /// `retry` governs the CAS loop; the default policy is 3 attempts at
    /// 100/200/400 ms.
    #[must_use]
    pub fn new(
        projections: Arc<dyn ProjectionStore>,
        snapshots: Arc<SnapshotManager>,
        hot_keys: Arc<HotKeyTracker>,
        fold: F,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            projections,
            snapshots,
            hot_keys,
            fold,
            retry,
        }
    }

    /// Apply one event to its aggregate's projection.
    ///
    /// Safe to invoke more than once for the same event: replays at or
    /// below the projection's version return
    /// [`ApplyOutcome::AlreadyApplied`] without writing.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::PersistentConflict`]: the CAS write lost every
    ///   retry (requeue the event)
    /// - [`UpdaterError::Projection`]: storage, serialization, or fold
    ///   failure
    pub async fn apply(&self, event: &EventRecord) -> Result<ApplyOutcome, UpdaterError> {
        let aggregate_id = event.aggregate.id.clone();
        let mut attempt = 0;

        loop {
            match self.try_apply_once(event).await {
                Ok(Step::Applied(record)) => {
                    self.after_apply(&record).await;
                    return Ok(ApplyOutcome::Applied);
                }
                Ok(Step::AlreadyApplied) => return Ok(ApplyOutcome::AlreadyApplied),
                Ok(Step::Deferred(expected)) => return Ok(ApplyOutcome::Deferred { expected }),
                Err(
                    conflict @ (ProjectionError::TokenMismatch { .. }
                    | ProjectionError::AlreadyExists(_)),
                ) => {
                    metrics::counter!("projections.cas_conflicts").increment(1);
                    if attempt >= self.retry.max_retries {
                        tracing::error!(
                            aggregate_id = %aggregate_id,
                            version = event.version.value(),
                            attempt,
                            error = %conflict,
                            "Projection write lost every retry"
                        );
                        return Err(UpdaterError::PersistentConflict {
                            aggregate_id,
                            version: event.version,
                        });
                    }

                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        aggregate_id = %aggregate_id,
                        version = event.version.value(),
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Projection write conflict, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn try_apply_once(&self, event: &EventRecord) -> Result<Step, ProjectionError> {
        let aggregate_id = event.aggregate.id.clone();
        let existing = self.projections.load(aggregate_id.clone()).await?;

        let (current, is_new) = match existing {
            Some(record) => (record, false),
            None => {
                let state = encode_state(&F::State::default())?;
                (ProjectionRecord::empty(aggregate_id.clone(), state), true)
            }
        };

        // Idempotency: replays are a successful no-op.
        if event.version <= current.last_event_version {
            metrics::counter!("events.duplicate").increment(1);
            tracing::debug!(
                aggregate_id = %aggregate_id,
                version = event.version.value(),
                projection_version = current.last_event_version.value(),
                "Event already applied, skipping"
            );
            return Ok(Step::AlreadyApplied);
        }

        // Ordering: only the next consecutive version may be folded.
        let expected = current.last_event_version.next();
        if event.version != expected {
            metrics::counter!("events.deferred").increment(1);
            tracing::debug!(
                aggregate_id = %aggregate_id,
                version = event.version.value(),
                expected = expected.value(),
                "Event out of order, deferring"
            );
            return Ok(Step::Deferred(expected));
        }

        let state: F::State = decode_state(&current.state)?;
        let new_state = self.fold.fold(state, event)?;

        let updated = ProjectionRecord {
            aggregate_id: aggregate_id.clone(),
            state: encode_state(&new_state)?,
            last_event_version: event.version,
            version_token: current.version_token,
            access_count: current.access_count,
            last_accessed_at: current.last_accessed_at,
        };

        let token = if is_new {
            self.projections.insert(updated.clone()).await?
        } else {
            let expected_token = current.version_token;
            self.projections.update(updated.clone(), expected_token).await?
        };

        metrics::counter!("events.applied").increment(1);
        Ok(Step::Applied(ProjectionRecord {
            version_token: token,
            ..updated
        }))
    }

    /// Post-apply side effects: hot-key score and snapshot evaluation.
    ///
    /// The event is already durably applied; a failing side effect is
    /// logged, never turned into a redelivery.
    async fn after_apply(&self, projection: &ProjectionRecord) {
        self.hot_keys.record_access(&projection.aggregate_id);

        if let Err(err) = self.snapshots.maybe_snapshot(projection).await {
            tracing::warn!(
                aggregate_id = %projection.aggregate_id,
                error = %err,
                "Snapshot evaluation failed after apply"
            );
        }
    }
}

fn encode_state<S: serde::Serialize>(state: &S) -> Result<Vec<u8>, ProjectionError> {
    bincode::serialize(state).map_err(|e| ProjectionError::Serialization(e.to_string()))
}

fn decode_state<S: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<S, ProjectionError> {
    bincode::deserialize(bytes).map_err(|e| ProjectionError::Serialization(e.to_string()))
}
