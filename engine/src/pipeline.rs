//! Ordered delivery of appended events to the projection updater.
//!
//! Events are routed onto a fixed set of lanes by hashing the aggregate
//! ID, so all events for one aggregate flow through the same lane and are
//! applied in order, while distinct aggregates proceed in parallel. Each
//! lane is a bounded mpsc channel consumed by one worker task.
//!
//! Delivery is at-least-once: an event the updater defers (a gap ahead of
//! the projection) or loses to a persistent write conflict is requeued on
//! its own lane after a short delay, never dropped. Idempotent application
//! makes the redelivery safe.

use crate::updater::{ApplyOutcome, ProjectionUpdater, UpdaterError};
use ledger_stream_core::event::EventRecord;
use ledger_stream_core::projection::ProjectionFold;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Errors from the delivery pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The pipeline has been shut down; no further events are accepted.
    #[error("Pipeline is shut down")]
    Closed,
}

/// Pipeline tuning.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Number of lanes (worker tasks). Parallelism across aggregates.
    pub lanes: usize,
    /// Bounded capacity of each lane's channel.
    pub lane_capacity: usize,
    /// Delay before a deferred or conflicted event is redelivered.
    pub requeue_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lanes: 8,
            lane_capacity: 256,
            requeue_delay: Duration::from_millis(50),
        }
    }
}

/// Hash-routed, per-aggregate-ordered event delivery.
pub struct ProjectionPipeline {
    senders: Vec<mpsc::Sender<EventRecord>>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
}

impl ProjectionPipeline {
    /// Start the pipeline's worker tasks.
    #[must_use]
    pub fn start<F>(updater: Arc<ProjectionUpdater<F>>, config: PipelineConfig) -> Self
    where
        F: ProjectionFold + 'static,
    {
        let lanes = config.lanes.max(1);
        let (shutdown, _) = watch::channel(false);
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut senders = Vec::with_capacity(lanes);
        let mut workers = Vec::with_capacity(lanes);
        for lane in 0..lanes {
            let (tx, rx) = mpsc::channel(config.lane_capacity.max(1));
            let worker = LaneWorker {
                lane,
                updater: Arc::clone(&updater),
                requeue: tx.clone(),
                requeue_delay: config.requeue_delay,
                in_flight: Arc::clone(&in_flight),
            };
            workers.push(tokio::spawn(worker.run(rx, shutdown.subscribe())));
            senders.push(tx);
        }

        tracing::info!(lanes, "Projection pipeline started");
        Self {
            senders,
            shutdown,
            workers,
            in_flight,
        }
    }

    /// Hand one appended event to its aggregate's lane.
    ///
    /// Blocks only when the lane's channel is full (backpressure).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Closed`] after shutdown.
    pub async fn publish(&self, event: EventRecord) -> Result<(), PipelineError> {
        let lane = self.lane_for(&event);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.senders[lane].send(event).await.is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(PipelineError::Closed);
        }
        Ok(())
    }

    /// Wait until every published event has reached a terminal outcome.
    ///
    /// Requeued events still count as pending, so this observes redelivery
    /// settling, not just channel emptiness.
    pub async fn drain(&self) {
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Signal shutdown and wait for every lane worker to exit.
    ///
    /// Events already buffered in lanes are processed before the workers
    /// stop; new publishes are rejected.
    pub async fn shutdown(mut self) {
        // Dropping the senders closes the lanes; workers exit once their
        // buffers empty.
        let _ = self.shutdown.send(true);
        self.senders.clear();
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "Lane worker did not shut down cleanly");
            }
        }
        tracing::info!("Projection pipeline stopped");
    }

    fn lane_for(&self, event: &EventRecord) -> usize {
        let mut hasher = DefaultHasher::new();
        event.aggregate.id.hash(&mut hasher);
        (hasher.finish() as usize) % self.senders.len()
    }
}

/// One lane's consumer.
struct LaneWorker<F: ProjectionFold> {
    lane: usize,
    updater: Arc<ProjectionUpdater<F>>,
    requeue: mpsc::Sender<EventRecord>,
    requeue_delay: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl<F: ProjectionFold + 'static> LaneWorker<F> {
    async fn run(
        self,
        mut rx: mpsc::Receiver<EventRecord>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.process(event).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        // Drain what is already buffered, then exit.
                        while let Ok(event) = rx.try_recv() {
                            self.process(event).await;
                        }
                        break;
                    }
                }
            }
        }
        tracing::debug!(lane = self.lane, "Lane worker exited");
    }

    async fn process(&self, event: EventRecord) {
        match self.updater.apply(&event).await {
            Ok(ApplyOutcome::Applied | ApplyOutcome::AlreadyApplied) => {
                self.settle();
            }
            Ok(ApplyOutcome::Deferred { expected }) => {
                tracing::debug!(
                    lane = self.lane,
                    aggregate_id = %event.aggregate.id,
                    version = event.version.value(),
                    expected = expected.value(),
                    "Requeueing out-of-order event"
                );
                self.requeue_later(event);
            }
            Err(UpdaterError::PersistentConflict { .. }) => {
                metrics::counter!("pipeline.requeued_conflicts").increment(1);
                tracing::warn!(
                    lane = self.lane,
                    aggregate_id = %event.aggregate.id,
                    version = event.version.value(),
                    "Requeueing event after persistent write conflict"
                );
                self.requeue_later(event);
            }
            Err(err) => {
                // Storage or fold failure: not recoverable by redelivery.
                metrics::counter!("pipeline.dead_lettered").increment(1);
                tracing::error!(
                    lane = self.lane,
                    aggregate_id = %event.aggregate.id,
                    version = event.version.value(),
                    error = %err,
                    "Dropping event after unrecoverable apply failure"
                );
                self.settle();
            }
        }
    }

    /// Redeliver on this lane after the configured delay.
    ///
    /// Runs off-worker so a full lane cannot deadlock against its own
    /// consumer.
    fn requeue_later(&self, event: EventRecord) {
        let requeue = self.requeue.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let delay = self.requeue_delay;
        tokio::spawn(async move {
            sleep(delay).await;
            if requeue.send(event).await.is_err() {
                // Shutdown raced the redelivery.
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });
    }

    fn settle(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
