//! In-memory event store honoring the real append contract.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use ledger_stream_core::event::EventRecord;
use ledger_stream_core::event_store::{EventStore, EventStoreError};
use ledger_stream_core::partition::{Partition, PartitionId, PartitionStatus};
use ledger_stream_core::stream::{AggregateRef, Version};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<AggregateRef, Vec<EventRecord>>,
    partitions: BTreeMap<PartitionId, Partition>,
    by_partition: HashMap<PartitionId, Vec<EventRecord>>,
}

/// In-memory, partition-routed event log.
///
/// Enforces the same append invariants as a real backend: gapless
/// versions per aggregate, `(aggregate, version)` uniqueness, and a
/// covering active partition for every `occurred_at`. Tests therefore see
/// [`EventStoreError::VersionConflict`], [`EventStoreError::VersionGap`],
/// and [`EventStoreError::PartitionNotProvisioned`] exactly where a
/// production store would produce them.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryEventStore {
    /// Create an empty store with no partitions.
    ///
    /// Appends fail with [`EventStoreError::PartitionNotProvisioned`]
    /// until a covering partition is created.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all partitions.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.inner
            .read()
            .unwrap()
            .streams
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Number of aggregates with at least one event.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.inner.read().unwrap().streams.len()
    }

    /// The status of a partition, if it exists.
    #[must_use]
    pub fn partition_status(&self, id: PartitionId) -> Option<PartitionStatus> {
        self.inner
            .read()
            .unwrap()
            .partitions
            .get(&id)
            .map(|p| p.status)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        event: EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().unwrap();

            let partition_id = inner
                .partitions
                .values()
                .find(|p| p.status == PartitionStatus::Active && p.covers(event.occurred_at))
                .map(|p| p.id)
                .ok_or(EventStoreError::PartitionNotProvisioned {
                    occurred_at: event.occurred_at,
                })?;

            let max = inner
                .streams
                .get(&event.aggregate)
                .and_then(|events| events.last())
                .map_or(Version::NONE, |last| last.version);
            if event.version <= max {
                return Err(EventStoreError::VersionConflict {
                    aggregate: event.aggregate,
                    version: event.version,
                });
            }
            let expected = max.next();
            if event.version != expected {
                return Err(EventStoreError::VersionGap {
                    aggregate: event.aggregate,
                    expected,
                    actual: event.version,
                });
            }

            inner
                .by_partition
                .entry(partition_id)
                .or_default()
                .push(event.clone());
            inner.streams.entry(event.aggregate.clone()).or_default().push(event);
            Ok(())
        })
    }

    fn read_stream(
        &self,
        aggregate: AggregateRef,
        from_version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<EventRecord>, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.read().unwrap();
            Ok(inner
                .streams
                .get(&aggregate)
                .map(|events| {
                    events
                        .iter()
                        .filter(|e| e.version >= from_version)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn max_version(
        &self,
        aggregate: AggregateRef,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.read().unwrap();
            Ok(inner
                .streams
                .get(&aggregate)
                .and_then(|events| events.last())
                .map_or(Version::NONE, |last| last.version))
        })
    }

    fn partitions(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Partition>, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            // BTreeMap keys are calendar years, so iteration order is
            // range order.
            Ok(self.inner.read().unwrap().partitions.values().cloned().collect())
        })
    }

    fn create_partition(
        &self,
        partition: Partition,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().unwrap();
            inner.partitions.entry(partition.id).or_insert(partition);
            Ok(())
        })
    }

    fn partition_events(
        &self,
        id: PartitionId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<EventRecord>, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.read().unwrap();
            if !inner.partitions.contains_key(&id) {
                return Err(EventStoreError::UnknownPartition(id));
            }
            let mut events = inner.by_partition.get(&id).cloned().unwrap_or_default();
            events.sort_by_key(|e| e.id);
            Ok(events)
        })
    }

    fn drop_partition(
        &self,
        id: PartitionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().unwrap();
            if !inner.partitions.contains_key(&id) {
                return Err(EventStoreError::UnknownPartition(id));
            }
            let dropped = inner.by_partition.remove(&id).unwrap_or_default();
            for event in &dropped {
                if let Some(stream) = inner.streams.get_mut(&event.aggregate) {
                    stream.retain(|e| e.id != event.id);
                }
            }
            inner.streams.retain(|_, events| !events.is_empty());
            Ok(())
        })
    }

    fn mark_archived(
        &self,
        id: PartitionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().unwrap();
            let partition = inner
                .partitions
                .get_mut(&id)
                .ok_or(EventStoreError::UnknownPartition(id))?;
            partition.status = PartitionStatus::Archived;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::EventSequence;
    use chrono::{TimeZone, Utc};

    fn at(year: i32, month: u32, day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap()
    }

    async fn store_with_partition(year: i32) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        store.create_partition(Partition::for_year(year)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn append_requires_a_covering_partition() {
        let store = store_with_partition(2025).await;
        let mut sequence = EventSequence::new(AggregateRef::new("acct-1", "account"));

        let outside = sequence.next("Debited.v1", vec![], at(2026, 1, 1));
        let result = store.append(outside).await;
        assert!(matches!(
            result,
            Err(EventStoreError::PartitionNotProvisioned { .. })
        ));
        assert_eq!(store.event_count(), 0);
    }

    #[tokio::test]
    async fn append_rejects_duplicate_versions() {
        let store = store_with_partition(2025).await;
        let aggregate = AggregateRef::new("acct-1", "account");
        let mut sequence = EventSequence::new(aggregate.clone());

        let first = sequence.next("Debited.v1", vec![], at(2025, 3, 1));
        let mut duplicate = first.clone();
        store.append(first).await.unwrap();

        duplicate.payload = vec![9];
        let result = store.append(duplicate).await;
        assert!(matches!(
            result,
            Err(EventStoreError::VersionConflict { version, .. }) if version == Version::FIRST
        ));
    }

    #[tokio::test]
    async fn append_rejects_version_gaps() {
        let store = store_with_partition(2025).await;
        let aggregate = AggregateRef::new("acct-1", "account");
        let mut sequence = EventSequence::new(aggregate.clone());

        store
            .append(sequence.next("Debited.v1", vec![], at(2025, 3, 1)))
            .await
            .unwrap();

        let mut skipping = sequence.next("Debited.v1", vec![], at(2025, 3, 2));
        skipping.version = Version::new(5);
        let result = store.append(skipping).await;
        assert!(matches!(
            result,
            Err(EventStoreError::VersionGap { expected, actual, .. })
                if expected == Version::new(2) && actual == Version::new(5)
        ));
    }

    #[tokio::test]
    async fn read_stream_filters_and_orders() {
        let store = store_with_partition(2025).await;
        let aggregate = AggregateRef::new("acct-1", "account");
        let mut sequence = EventSequence::new(aggregate.clone());
        for day in 1..=5 {
            store
                .append(sequence.next("Debited.v1", vec![day as u8], at(2025, 3, day)))
                .await
                .unwrap();
        }

        let tail = store
            .read_stream(aggregate.clone(), Version::new(3))
            .await
            .unwrap();
        let versions: Vec<u64> = tail.iter().map(|e| e.version.value()).collect();
        assert_eq!(versions, vec![3, 4, 5]);
        assert_eq!(store.max_version(aggregate).await.unwrap(), Version::new(5));
    }

    #[tokio::test]
    async fn unknown_aggregate_reads_empty() {
        let store = store_with_partition(2025).await;
        let events = store
            .read_stream(AggregateRef::new("ghost", "account"), Version::FIRST)
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn create_partition_is_idempotent() {
        let store = store_with_partition(2025).await;
        store
            .create_partition(Partition::for_year(2025))
            .await
            .unwrap();
        assert_eq!(store.partitions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drop_partition_removes_its_events() {
        let store = store_with_partition(2024).await;
        store.create_partition(Partition::for_year(2025)).await.unwrap();

        let aggregate = AggregateRef::new("acct-1", "account");
        let mut sequence = EventSequence::new(aggregate.clone());
        store
            .append(sequence.next("Debited.v1", vec![], at(2024, 6, 1)))
            .await
            .unwrap();
        store
            .append(sequence.next("Debited.v1", vec![], at(2025, 6, 1)))
            .await
            .unwrap();

        store.drop_partition(PartitionId::new(2024)).await.unwrap();
        let remaining = store.read_stream(aggregate, Version::FIRST).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].version, Version::new(2));
    }

    #[tokio::test]
    async fn mark_archived_flips_status_and_blocks_appends() {
        let store = store_with_partition(2025).await;
        store.mark_archived(PartitionId::new(2025)).await.unwrap();
        assert_eq!(
            store.partition_status(PartitionId::new(2025)),
            Some(PartitionStatus::Archived)
        );

        let mut sequence = EventSequence::new(AggregateRef::new("acct-1", "account"));
        let result = store
            .append(sequence.next("Debited.v1", vec![], at(2025, 3, 1)))
            .await;
        assert!(matches!(
            result,
            Err(EventStoreError::PartitionNotProvisioned { .. })
        ));
    }
}
