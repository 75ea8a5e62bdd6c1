//! # Ledger Stream Engine
//!
//! The projection engine over [`ledger_stream_core`]'s storage seams:
//!
//! - [`updater`]: the live path, folding appended events into projections
//!   under optimistic concurrency control
//! - [`pipeline`]: hash-routed lanes delivering events to the updater in
//!   per-aggregate order, with at-least-once redelivery
//! - [`snapshots`]: interval-based snapshot capture, tuned per key
//!   temperature
//! - [`hot_keys`]: access-frequency tracking and hot/warm/cold
//!   classification
//! - [`warmer`]: pre-loading the hottest projections into the
//!   read-through cache
//! - [`partitions`]: provisioning future time partitions and archiving
//!   expired ones to cold storage
//! - [`rebuild`]: reconstructing projections from snapshot + replay,
//!   bit-identical to the live path
//! - [`ledger`]: the account-balance domain, debit/credit events and
//!   their fold
//!
//! The live and rebuild paths share one pure
//! [`ProjectionFold`](ledger_stream_core::projection::ProjectionFold), so
//! a rebuilt projection always matches what incremental application
//! produced.

pub mod hot_keys;
pub mod ledger;
pub mod partitions;
pub mod pipeline;
pub mod rebuild;
pub mod retry;
pub mod snapshots;
pub mod updater;
pub mod warmer;

pub use hot_keys::{HotKeyTracker, Temperature};
pub use ledger::{AccountBalance, BalanceFold, LedgerEvent};
pub use partitions::{ArchiveError, ArchiveSummary, PartitionLifecycleManager};
pub use pipeline::{PipelineConfig, PipelineError, ProjectionPipeline};
pub use rebuild::{
    RebuildConfig, RebuildCoordinator, RebuildError, RebuildOptions, RebuildReport,
    RebuildSummary,
};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use snapshots::{SnapshotManager, SnapshotPolicy};
pub use updater::{ApplyOutcome, ProjectionUpdater, UpdaterError};
pub use warmer::{CacheWarmer, WarmReport};
