//! Point-in-time projection snapshots.
//!
//! A snapshot captures a projection's serialized state at a specific
//! version so replay cost stays bounded: rebuilding from a snapshot only
//! replays events with `version > snapshot.version`. Snapshots are
//! superseded by newer ones, never patched.

use crate::stream::{AggregateId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during snapshot operations.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The stored snapshot cannot be decoded.
    ///
    /// Callers fall back to full replay from version 1 and log the
    /// incident; a corrupt snapshot never aborts a rebuild.
    #[error("Corrupt snapshot for {aggregate_id} at version {version}: {reason}")]
    Corrupt {
        /// The aggregate whose snapshot is unreadable.
        aggregate_id: AggregateId,
        /// The version the snapshot claims to capture.
        version: Version,
        /// Decode failure detail.
        reason: String,
    },

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// A captured projection state at a specific version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The aggregate this snapshot belongs to.
    pub aggregate_id: AggregateId,
    /// The projection's `last_event_version` at capture time.
    pub version: Version,
    /// Bincode-serialized domain state.
    pub state: Vec<u8>,
    /// When the snapshot was captured.
    pub taken_at: DateTime<Utc>,
}

/// Storage for snapshots, keyed by `(aggregate_id, version)`.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the engine can hold
/// `Arc<dyn SnapshotStore>` dependencies.
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot. A snapshot at the same version overwrites the
    /// previous capture; older versions are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Storage`] on backend failure.
    fn save(
        &self,
        snapshot: Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<(), SnapshotError>> + Send + '_>>;

    /// The most recent snapshot for the aggregate, or `None`.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::Corrupt`]: the stored bytes are unreadable
    /// - [`SnapshotError::Storage`]: backend failure
    fn latest(
        &self,
        aggregate_id: AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>, SnapshotError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_display_names_the_aggregate() {
        let error = SnapshotError::Corrupt {
            aggregate_id: AggregateId::new("acct-9"),
            version: Version::new(12),
            reason: "truncated".to_string(),
        };
        let display = format!("{error}");
        assert!(display.contains("acct-9"));
        assert!(display.contains("version 12"));
    }
}
