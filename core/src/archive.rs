//! Cold storage seam and the archival export manifest.
//!
//! Partition archival exports a whole partition as one checksummed,
//! compressed blob to a [`ColdStorage`] destination, verifies the export
//! by re-reading it, and only then drops the partition from hot storage.
//! The [`ArchiveManifest`] travels inside the blob so verification can
//! check completeness (event count, range) as well as integrity
//! (checksum).

use crate::partition::PartitionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur talking to cold storage.
#[derive(Error, Debug)]
pub enum ColdStorageError {
    /// The requested object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Backend failure (network, disk, credentials).
    #[error("Cold storage error: {0}")]
    Backend(String),
}

/// Durable, write-once destination for archived partitions.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the engine can hold
/// `Arc<dyn ColdStorage>` dependencies.
pub trait ColdStorage: Send + Sync {
    /// Store a blob under `key`, overwriting any previous attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ColdStorageError::Backend`] on backend failure.
    fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ColdStorageError>> + Send + '_>>;

    /// Read a blob back, byte for byte.
    ///
    /// # Errors
    ///
    /// - [`ColdStorageError::NotFound`]: nothing stored under `key`
    /// - [`ColdStorageError::Backend`]: backend failure
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, ColdStorageError>> + Send + '_>>;
}

/// Description of one exported partition, embedded in the export blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// The exported partition.
    pub partition_id: PartitionId,
    /// Inclusive start of the partition's range.
    pub range_start: DateTime<Utc>,
    /// Exclusive end of the partition's range.
    pub range_end: DateTime<Utc>,
    /// Number of events in the export.
    pub event_count: u64,
    /// Hex-encoded SHA-256 of the serialized event payload section.
    pub checksum: String,
    /// When the export was produced.
    pub exported_at: DateTime<Utc>,
}
