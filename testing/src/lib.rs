//! # Ledger Stream Testing
//!
//! In-memory fakes for every storage seam in [`ledger_stream_core`], plus
//! deterministic time and event fixtures:
//!
//! - [`InMemoryEventStore`]: partition-routed, version-checked event log
//! - [`InMemoryProjectionStore`]: token-CAS projection storage
//! - [`InMemorySnapshotStore`]: snapshot storage with corruption injection
//! - [`InMemoryColdStorage`]: archive destination with failure injection
//! - [`InMemoryCache`]: TTL cache driven by an injected clock
//! - [`ManualClock`]: settable, advanceable time source
//! - [`EventSequence`]: builder for gapless event streams
//!
//! Everything is `HashMap` + `RwLock` based: fast, deterministic, and
//! honest about the trait contracts (version conflicts, token mismatches,
//! partition routing) so engine tests exercise the real failure paths.
//!
//! ## Example
//!
//! ```
//! use ledger_stream_testing::{InMemoryEventStore, EventSequence};
//! use ledger_stream_core::event_store::EventStore;
//! use ledger_stream_core::partition::Partition;
//! use ledger_stream_core::stream::{AggregateRef, Version};
//! use chrono::Utc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryEventStore::new();
//! store.create_partition(Partition::covering(Utc::now())).await?;
//!
//! let aggregate = AggregateRef::new("acct-1", "account");
//! let mut sequence = EventSequence::new(aggregate.clone());
//! store
//!     .append(sequence.next("Debited.v1", vec![1, 2, 3], Utc::now()))
//!     .await?;
//!
//! assert_eq!(store.max_version(aggregate).await?, Version::FIRST);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod cold_storage;
pub mod event_store;
pub mod fixtures;
pub mod projection_store;
pub mod snapshot_store;

pub use cache::InMemoryCache;
pub use clock::{ManualClock, test_clock};
pub use cold_storage::InMemoryColdStorage;
pub use event_store::InMemoryEventStore;
pub use fixtures::EventSequence;
pub use projection_store::InMemoryProjectionStore;
pub use snapshot_store::InMemorySnapshotStore;
