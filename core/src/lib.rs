//! # Ledger Stream Core
//!
//! Core types and trait seams for the ledger-stream projection engine.
//!
//! This crate defines the data model of the event-sourced ledger (events,
//! partitions, projections, snapshots) and the dyn-compatible trait seams
//! the engine crate is built against. It performs no I/O itself: storage
//! backends implement the traits, the engine composes them.
//!
//! ## Core Concepts
//!
//! - **Event**: an immutable fact, versioned per aggregate, routed to a
//!   time partition by `occurred_at`
//! - **Partition**: a calendar-year slice of the log, archived as a unit
//! - **Projection**: materialized current state per aggregate, mutated
//!   only through optimistic compare-and-swap
//! - **Snapshot**: captured projection state bounding replay cost
//!
//! ## Architecture Principles
//!
//! - Append-only source of truth (events are never updated or deleted)
//! - Explicit dependencies (clock, stores, cache are trait parameters,
//!   never globals)
//! - Contention by retry, not by locks
//!
//! ## Example
//!
//! ```
//! use ledger_stream_core::event::{EventIdGenerator, EventMetadata, EventRecord};
//! use ledger_stream_core::stream::{AggregateRef, Version};
//! use chrono::Utc;
//!
//! let ids = EventIdGenerator::new(1);
//! let event = EventRecord::new(
//!     ids.next_id(),
//!     AggregateRef::new("acct-1", "account"),
//!     Version::FIRST,
//!     "Debited.v1",
//!     vec![],
//!     EventMetadata::correlated("req-42"),
//!     Utc::now(),
//! );
//! assert_eq!(event.version, Version::FIRST);
//! ```

pub mod archive;
pub mod cache;
pub mod clock;
pub mod event;
pub mod event_store;
pub mod partition;
pub mod projection;
pub mod snapshot;
pub mod stream;

// Re-export commonly used types
pub use archive::{ArchiveManifest, ColdStorage, ColdStorageError};
pub use cache::{CacheError, ProjectionCache};
pub use clock::{Clock, SystemClock};
pub use event::{EventId, EventIdGenerator, EventMetadata, EventRecord};
pub use event_store::{EventStore, EventStoreError};
pub use partition::{Partition, PartitionId, PartitionStatus};
pub use projection::{
    ProjectionError, ProjectionFold, ProjectionRecord, ProjectionStore, VersionToken,
};
pub use snapshot::{Snapshot, SnapshotError, SnapshotStore};
pub use stream::{AggregateId, AggregateRef, AggregateType, Version};

// Re-export chrono types used throughout the public API
pub use chrono::{DateTime, Utc};
