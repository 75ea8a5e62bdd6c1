//! Out-of-band projection rebuilds.
//!
//! The rebuild path reconstructs projections from the event log,
//! independently of the live updater, and must land on exactly the same
//! state: both paths share the pure [`ProjectionFold`], and snapshot-based
//! replay is a performance optimization, never a behavior change.
//!
//! `rebuild_all` fans out over a bounded worker pool (a semaphore with
//! one permit per worker), paces dispatch so downstream storage is not
//! overwhelmed, and collects per-aggregate failures without aborting
//! sibling jobs.

use crate::retry::RetryPolicy;
use crate::snapshots::SnapshotManager;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use ledger_stream_core::event_store::{EventStore, EventStoreError};
use ledger_stream_core::projection::{
    ProjectionError, ProjectionFold, ProjectionRecord, ProjectionStore,
};
use ledger_stream_core::snapshot::SnapshotError;
use ledger_stream_core::stream::{AggregateId, AggregateType, Version};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{Instant, sleep, timeout};

/// Bounds on the rebuild worker pool.
pub const MIN_WORKERS: usize = 1;
/// Upper bound on the rebuild worker pool.
pub const MAX_WORKERS: usize = 20;

/// Errors from the rebuild path.
#[derive(Error, Debug)]
pub enum RebuildError {
    /// One rebuild job exceeded its time budget.
    #[error("Rebuild of {aggregate_id} timed out after {budget_ms}ms")]
    JobTimeout {
        /// The aggregate being rebuilt.
        aggregate_id: AggregateId,
        /// The exceeded budget.
        budget_ms: u128,
    },

    /// Event store failure while replaying.
    #[error("Event store error: {0}")]
    Store(#[from] EventStoreError),

    /// Projection storage, serialization, or fold failure.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// Snapshot store failure (a corrupt snapshot is not an error here;
    /// it falls back to full replay).
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Tuning for rebuild jobs.
#[derive(Clone, Debug)]
pub struct RebuildConfig {
    /// Time budget per aggregate rebuild.
    pub job_timeout: Duration,
    /// Delay between dispatch batches in `rebuild_all`.
    pub pacing_delay: Duration,
    /// Retry schedule for timed-out jobs.
    pub retry: RetryPolicy,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(300),
            pacing_delay: Duration::from_millis(100),
            retry: RetryPolicy::builder()
                .max_retries(3)
                .initial_delay(Duration::from_millis(500))
                .build(),
        }
    }
}

/// Options for a `rebuild_all` run.
#[derive(Clone, Debug)]
pub struct RebuildOptions {
    /// Worker pool size; clamped to `1..=20`.
    pub workers: usize,
    /// Restrict the run to one aggregate.
    pub account_filter: Option<AggregateId>,
    /// Start from the latest snapshot instead of version 1.
    pub use_snapshot: bool,
    /// Report the target set and event counts without writing anything.
    pub dry_run: bool,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            account_filter: None,
            use_snapshot: true,
            dry_run: false,
        }
    }
}

/// Result of one aggregate's rebuild.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebuildReport {
    /// The rebuilt aggregate.
    pub aggregate_id: AggregateId,
    /// Number of events replayed (excluding those inside the snapshot).
    pub events_processed: u64,
    /// The projection's version after the rebuild.
    pub final_version: Version,
    /// Wall-clock duration of the job.
    pub duration: Duration,
}

/// One aggregate's share of a dry run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedRebuild {
    /// The aggregate that would be rebuilt.
    pub aggregate_id: AggregateId,
    /// Number of events a full replay would process.
    pub event_count: u64,
}

/// Outcome of a `rebuild_all` run.
#[derive(Clone, Debug, Default)]
pub struct RebuildSummary {
    /// Dry run only: the target set with event counts.
    pub planned: Vec<PlannedRebuild>,
    /// Aggregates rebuilt successfully.
    pub completed: Vec<RebuildReport>,
    /// Aggregates whose rebuild exhausted its retries, with the reason.
    pub failed: Vec<(AggregateId, String)>,
}

/// Rebuilds projections from snapshot + event replay.
pub struct RebuildCoordinator<F: ProjectionFold> {
    events: Arc<dyn EventStore>,
    projections: Arc<dyn ProjectionStore>,
    snapshots: Arc<SnapshotManager>,
    fold: F,
    aggregate_type: AggregateType,
    config: RebuildConfig,
}

impl<F: ProjectionFold> RebuildCoordinator<F> {
    /// Create a coordinator for aggregates of the given type.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        projections: Arc<dyn ProjectionStore>,
        snapshots: Arc<SnapshotManager>,
        fold: F,
        aggregate_type: AggregateType,
        config: RebuildConfig,
    ) -> Self {
        Self {
            events,
            projections,
            snapshots,
            fold,
            aggregate_type,
            config,
        }
    }

    /// Rebuild one aggregate's projection.
    ///
    /// With `use_snapshot`, replay starts from the latest snapshot's
    /// state and version; a corrupt snapshot is logged and the rebuild
    /// falls back to a full replay from version 1. On completion the live
    /// projection is replaced wholesale, not merged.
    ///
    /// # Errors
    ///
    /// Returns [`RebuildError`] if reading events, folding, or writing
    /// the replacement projection fails.
    pub async fn rebuild_one(
        &self,
        aggregate_id: AggregateId,
        use_snapshot: bool,
    ) -> Result<RebuildReport, RebuildError> {
        let started = Instant::now();

        let (mut state, mut version) = if use_snapshot {
            self.snapshot_base(&aggregate_id).await?
        } else {
            (F::State::default(), Version::NONE)
        };

        let aggregate =
            ledger_stream_core::stream::AggregateRef {
                id: aggregate_id.clone(),
                kind: self.aggregate_type.clone(),
            };
        let events = self
            .events
            .read_stream(aggregate, version.next())
            .await?;

        // Strictly sequential fold; events for one aggregate are never
        // interleaved.
        let mut events_processed = 0_u64;
        for event in &events {
            state = self.fold.fold(state, event)?;
            version = event.version;
            events_processed += 1;
        }

        let existing = self.projections.load(aggregate_id.clone()).await?;
        let (access_count, last_accessed_at) = existing
            .map_or((0, None), |p| (p.access_count, p.last_accessed_at));

        let record = ProjectionRecord {
            aggregate_id: aggregate_id.clone(),
            state: bincode::serialize(&state)
                .map_err(|e| ProjectionError::Serialization(e.to_string()))?,
            last_event_version: version,
            version_token: ledger_stream_core::projection::VersionToken::INITIAL,
            access_count,
            last_accessed_at,
        };
        self.projections.replace(record).await?;

        let duration = started.elapsed();
        metrics::histogram!("rebuild.duration_seconds").record(duration.as_secs_f64());
        tracing::info!(
            aggregate_id = %aggregate_id,
            events = events_processed,
            final_version = version.value(),
            duration_ms = duration.as_millis(),
            "Projection rebuilt"
        );

        Ok(RebuildReport {
            aggregate_id,
            events_processed,
            final_version: version,
            duration,
        })
    }

    /// Rebuild every targeted projection through a bounded worker pool.
    ///
    /// Jobs time out per [`RebuildConfig::job_timeout`] and are retried
    /// per its retry schedule; an aggregate that exhausts its retries is
    /// reported in `failed` without disturbing sibling jobs. With
    /// `dry_run`, the target set and event counts are reported and no
    /// projection is written.
    ///
    /// # Errors
    ///
    /// Returns [`RebuildError`] only if enumerating the target set fails;
    /// per-aggregate failures land in the summary.
    pub async fn rebuild_all(
        self: &Arc<Self>,
        options: RebuildOptions,
    ) -> Result<RebuildSummary, RebuildError>
    where
        F: 'static,
    {
        let workers = options.workers.clamp(MIN_WORKERS, MAX_WORKERS);
        let targets = match &options.account_filter {
            Some(id) => vec![id.clone()],
            None => self.projections.aggregate_ids().await?,
        };

        tracing::info!(
            targets = targets.len(),
            workers,
            dry_run = options.dry_run,
            "Starting rebuild run"
        );

        if options.dry_run {
            return self.plan(targets).await;
        }

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut jobs = FuturesUnordered::new();
        let mut summary = RebuildSummary::default();

        for (dispatched, aggregate_id) in targets.into_iter().enumerate() {
            // Pace dispatch so downstream storage sees batches, not a
            // thundering herd.
            if dispatched > 0 && dispatched % workers == 0 {
                sleep(self.config.pacing_delay).await;
            }

            let coordinator = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let use_snapshot = options.use_snapshot;
            jobs.push(tokio::spawn(async move {
                // Closing the semaphore is never done; acquire cannot fail.
                let _permit = semaphore.acquire().await;
                let result = coordinator
                    .rebuild_with_retries(aggregate_id.clone(), use_snapshot)
                    .await;
                (aggregate_id, result)
            }));
        }

        while let Some(joined) = jobs.next().await {
            match joined {
                Ok((_, Ok(report))) => summary.completed.push(report),
                Ok((aggregate_id, Err(err))) => {
                    tracing::error!(
                        aggregate_id = %aggregate_id,
                        error = %err,
                        "Rebuild failed after retries"
                    );
                    summary.failed.push((aggregate_id, err.to_string()));
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Rebuild worker panicked");
                }
            }
        }

        metrics::counter!("rebuild.completed").increment(summary.completed.len() as u64);
        metrics::counter!("rebuild.failed").increment(summary.failed.len() as u64);
        tracing::info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            "Rebuild run finished"
        );
        Ok(summary)
    }

    /// One job with its time budget and retry schedule applied.
    async fn rebuild_with_retries(
        &self,
        aggregate_id: AggregateId,
        use_snapshot: bool,
    ) -> Result<RebuildReport, RebuildError> {
        let budget = self.config.job_timeout;
        crate::retry::retry_with_backoff(&self.config.retry, || {
            let aggregate_id = aggregate_id.clone();
            async move {
                match timeout(budget, self.rebuild_one(aggregate_id.clone(), use_snapshot)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(RebuildError::JobTimeout {
                        aggregate_id,
                        budget_ms: budget.as_millis(),
                    }),
                }
            }
        })
        .await
    }

    /// Dry run: enumerate the target set and its event counts.
    async fn plan(&self, targets: Vec<AggregateId>) -> Result<RebuildSummary, RebuildError> {
        let mut summary = RebuildSummary::default();
        for aggregate_id in targets {
            let aggregate = ledger_stream_core::stream::AggregateRef {
                id: aggregate_id.clone(),
                kind: self.aggregate_type.clone(),
            };
            let events = self.events.read_stream(aggregate, Version::FIRST).await?;
            summary.planned.push(PlannedRebuild {
                aggregate_id,
                event_count: events.len() as u64,
            });
        }
        Ok(summary)
    }

    /// Starting state and version for a snapshot-based replay.
    async fn snapshot_base(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<(F::State, Version), RebuildError> {
        match self.snapshots.latest(aggregate_id.clone()).await {
            Ok(Some(snapshot)) => match bincode::deserialize(&snapshot.state) {
                Ok(state) => Ok((state, snapshot.version)),
                Err(err) => {
                    tracing::warn!(
                        aggregate_id = %aggregate_id,
                        version = snapshot.version.value(),
                        error = %err,
                        "Snapshot state undecodable; falling back to full replay"
                    );
                    Ok((F::State::default(), Version::NONE))
                }
            },
            Ok(None) => Ok((F::State::default(), Version::NONE)),
            Err(SnapshotError::Corrupt { version, reason, .. }) => {
                tracing::warn!(
                    aggregate_id = %aggregate_id,
                    version = version.value(),
                    reason = %reason,
                    "Corrupt snapshot; falling back to full replay"
                );
                Ok((F::State::default(), Version::NONE))
            }
            Err(err) => Err(err.into()),
        }
    }
}
