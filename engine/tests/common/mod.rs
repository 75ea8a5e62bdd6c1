//! Shared fixture: the full engine wired over in-memory fakes.

#![allow(dead_code)] // Not every test file uses every helper
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use chrono::{DateTime, TimeZone, Utc};
use ledger_stream_core::clock::Clock;
use ledger_stream_core::event::EventRecord;
use ledger_stream_core::event_store::EventStore;
use ledger_stream_core::projection::{ProjectionRecord, ProjectionStore};
use ledger_stream_core::partition::Partition;
use ledger_stream_core::stream::{AggregateId, AggregateRef, AggregateType};
use ledger_stream_engine::hot_keys::HotKeyTracker;
use ledger_stream_engine::ledger::{AccountBalance, BalanceFold, LedgerEvent};
use ledger_stream_engine::rebuild::{RebuildConfig, RebuildCoordinator};
use ledger_stream_engine::retry::RetryPolicy;
use ledger_stream_engine::snapshots::{SnapshotManager, SnapshotPolicy};
use ledger_stream_engine::updater::ProjectionUpdater;
use ledger_stream_testing::{
    EventSequence, InMemoryCache, InMemoryColdStorage, InMemoryEventStore,
    InMemoryProjectionStore, InMemorySnapshotStore, ManualClock, test_clock,
};
use std::sync::Arc;
use std::time::Duration;

/// The whole engine over in-memory backends.
pub struct Stack {
    pub events: Arc<InMemoryEventStore>,
    pub projections: Arc<InMemoryProjectionStore>,
    pub snapshot_store: Arc<InMemorySnapshotStore>,
    pub cold_storage: Arc<InMemoryColdStorage>,
    pub cache: Arc<InMemoryCache>,
    pub clock: Arc<ManualClock>,
    pub hot_keys: Arc<HotKeyTracker>,
    pub snapshots: Arc<SnapshotManager>,
    pub updater: Arc<ProjectionUpdater<BalanceFold>>,
}

/// Stack with the default snapshot policy and a partition for 2025.
pub async fn stack() -> Stack {
    stack_with_policy(SnapshotPolicy::default()).await
}

/// Stack with a custom snapshot policy and a partition for 2025.
pub async fn stack_with_policy(policy: SnapshotPolicy) -> Stack {
    let events = Arc::new(InMemoryEventStore::new());
    let projections = Arc::new(InMemoryProjectionStore::new());
    let snapshot_store = Arc::new(InMemorySnapshotStore::new());
    let cold_storage = Arc::new(InMemoryColdStorage::new());
    let clock = Arc::new(test_clock());
    let cache = Arc::new(InMemoryCache::new(Arc::clone(&clock) as Arc<dyn Clock>));
    let hot_keys = Arc::new(HotKeyTracker::new());

    let snapshots = Arc::new(SnapshotManager::new(
        Arc::clone(&snapshot_store) as Arc<dyn ledger_stream_core::snapshot::SnapshotStore>,
        Arc::clone(&hot_keys),
        Arc::clone(&clock) as Arc<dyn Clock>,
        policy,
    ));
    let updater = Arc::new(ProjectionUpdater::new(
        Arc::clone(&projections) as Arc<dyn ProjectionStore>,
        Arc::clone(&snapshots),
        Arc::clone(&hot_keys),
        BalanceFold,
        fast_retry(),
    ));

    events
        .create_partition(Partition::for_year(2025))
        .await
        .unwrap();

    Stack {
        events,
        projections,
        snapshot_store,
        cold_storage,
        cache,
        clock,
        hot_keys,
        snapshots,
        updater,
    }
}

impl Stack {
    /// Rebuild coordinator for `account` aggregates over this stack.
    pub fn coordinator(&self) -> Arc<RebuildCoordinator<BalanceFold>> {
        let config = RebuildConfig {
            pacing_delay: Duration::from_millis(1),
            ..RebuildConfig::default()
        };
        Arc::new(RebuildCoordinator::new(
            Arc::clone(&self.events) as Arc<dyn EventStore>,
            Arc::clone(&self.projections) as Arc<dyn ProjectionStore>,
            Arc::clone(&self.snapshots),
            BalanceFold,
            AggregateType::new("account"),
            config,
        ))
    }

    /// Append a ledger event and apply it through the live updater.
    pub async fn commit(
        &self,
        sequence: &mut EventSequence,
        event: &LedgerEvent,
        occurred_at: DateTime<Utc>,
    ) -> EventRecord {
        let record = ledger_record(sequence, event, occurred_at);
        self.events.append(record.clone()).await.unwrap();
        self.updater.apply(&record).await.unwrap();
        record
    }

    /// The materialized balance for an account.
    pub async fn balance(&self, aggregate_id: &AggregateId) -> AccountBalance {
        let record = self
            .projections
            .load(aggregate_id.clone())
            .await
            .unwrap()
            .expect("projection should exist");
        decode_balance(&record)
    }
}

/// Retry schedule that keeps tests fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(3)
        .initial_delay(Duration::from_millis(1))
        .build()
}

pub fn account(id: &str) -> AggregateRef {
    AggregateRef::new(id, "account")
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 10, 30, 0).unwrap()
}

/// Mid-2025, inside the fixture's provisioned partition.
pub fn in_partition() -> DateTime<Utc> {
    at(2025, 6, 1)
}

pub fn ledger_record(
    sequence: &mut EventSequence,
    event: &LedgerEvent,
    occurred_at: DateTime<Utc>,
) -> EventRecord {
    sequence.next(event.event_type(), event.encode().unwrap(), occurred_at)
}

pub fn decode_balance(record: &ProjectionRecord) -> AccountBalance {
    bincode::deserialize(&record.state).unwrap()
}

pub fn debit(amount_minor: i64) -> LedgerEvent {
    LedgerEvent::Debited { amount_minor }
}

pub fn credit(amount_minor: i64) -> LedgerEvent {
    LedgerEvent::Credited { amount_minor }
}
