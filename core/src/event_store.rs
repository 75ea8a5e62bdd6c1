//! Event store trait: the append-only, time-partitioned log of domain events.
//!
//! # Design
//!
//! The `EventStore` trait is deliberately minimal. The append path enforces
//! the two invariants the whole engine rests on:
//!
//! - `(aggregate, version)` is unique: a concurrent writer racing for the
//!   same version gets [`EventStoreError::VersionConflict`] and must
//!   re-derive the next version before retrying.
//! - every event's `occurred_at` must land inside an existing partition:
//!   otherwise the append fails with
//!   [`EventStoreError::PartitionNotProvisioned`], which is a provisioning
//!   error for the operator, never fixed by creating a partition inline.
//!
//! There are no update or delete operations on individual events. The only
//! bulk removal path is partition archival, which uses the partition
//! surface of this trait (`partition_events`, `drop_partition`,
//! `mark_archived`).
//!
//! # Dyn Compatibility
//!
//! The trait uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so the engine can hold `Arc<dyn EventStore>` dependencies.

use crate::event::EventRecord;
use crate::partition::{Partition, PartitionId};
use crate::stream::{AggregateRef, Version};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// A concurrent writer already committed this version for the aggregate.
    ///
    /// The caller must re-read the current max version and retry the append
    /// with the next one.
    #[error("Version conflict on {aggregate}: version {version} already committed")]
    VersionConflict {
        /// The aggregate where the conflict occurred.
        aggregate: AggregateRef,
        /// The version both writers raced for.
        version: Version,
    },

    /// The event's version is not `max_version + 1`.
    ///
    /// Appends must be gapless; this surfaces a caller that skipped a
    /// version or reused a stale one.
    #[error("Version gap on {aggregate}: expected {expected}, got {actual}")]
    VersionGap {
        /// The aggregate being appended to.
        aggregate: AggregateRef,
        /// The only version the store would accept.
        expected: Version,
        /// The version the caller supplied.
        actual: Version,
    },

    /// No partition covers the event's `occurred_at`.
    ///
    /// Fatal for the append; partitions are provisioned ahead of need by
    /// the lifecycle manager, never synchronously.
    #[error("No partition provisioned for {occurred_at}")]
    PartitionNotProvisioned {
        /// The timestamp that has no covering partition.
        occurred_at: DateTime<Utc>,
    },

    /// The referenced partition does not exist.
    #[error("Unknown partition: {0}")]
    UnknownPartition(PartitionId),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Append-only, time-partitioned log of domain events keyed by aggregate.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; many writers append concurrently
/// and are serialized only by the uniqueness invariant.
pub trait EventStore: Send + Sync {
    /// Append one event.
    ///
    /// Validates that `event.version` is exactly `max_version + 1` for the
    /// aggregate and routes the record to the partition covering
    /// `event.occurred_at`.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::VersionConflict`]: a concurrent writer won the
    ///   race for this version (retry with the next version)
    /// - [`EventStoreError::VersionGap`]: the supplied version skips ahead
    /// - [`EventStoreError::PartitionNotProvisioned`]: no partition covers
    ///   `occurred_at`
    /// - [`EventStoreError::Storage`]: backend failure
    fn append(
        &self,
        event: EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>>;

    /// Read an aggregate's events with `version >= from_version`, strictly
    /// ordered ascending.
    ///
    /// Finite and restartable: calling it again with the same arguments
    /// returns the same prefix (plus anything appended since). An unknown
    /// aggregate yields an empty vector, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] on backend failure.
    fn read_stream(
        &self,
        aggregate: AggregateRef,
        from_version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<EventRecord>, EventStoreError>> + Send + '_>>;

    /// Current high-water mark for the aggregate; [`Version::NONE`] if the
    /// stream is empty.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] on backend failure.
    fn max_version(
        &self,
        aggregate: AggregateRef,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;

    /// All known partitions, ordered by range start.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] on backend failure.
    fn partitions(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Partition>, EventStoreError>> + Send + '_>>;

    /// Create a partition. Idempotent: creating an existing partition is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] on backend failure.
    fn create_partition(
        &self,
        partition: Partition,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>>;

    /// All events stored in the given partition, ordered by event ID.
    ///
    /// Used by the archival path to export a partition as a unit.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::UnknownPartition`] if the partition does
    /// not exist, [`EventStoreError::Storage`] on backend failure.
    fn partition_events(
        &self,
        id: PartitionId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<EventRecord>, EventStoreError>> + Send + '_>>;

    /// Detach a partition and drop its events from hot storage.
    ///
    /// Only the archival path calls this, and only after a verified export.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::UnknownPartition`] if the partition does
    /// not exist, [`EventStoreError::Storage`] on backend failure.
    fn drop_partition(
        &self,
        id: PartitionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>>;

    /// Record that a partition has been archived.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::UnknownPartition`] if the partition does
    /// not exist, [`EventStoreError::Storage`] on backend failure.
    fn mark_archived(
        &self,
        id: PartitionId,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>>;
}
