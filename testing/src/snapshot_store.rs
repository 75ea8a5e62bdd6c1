//! In-memory snapshot store with corruption injection.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use ledger_stream_core::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use ledger_stream_core::stream::{AggregateId, Version};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// In-memory snapshot storage keyed by `(aggregate_id, version)`.
///
/// `mark_corrupt` makes `latest` fail with [`SnapshotError::Corrupt`] for
/// one aggregate, so tests can prove that rebuilds fall back to full
/// replay instead of aborting.
#[derive(Clone, Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<RwLock<HashMap<AggregateId, Vec<Snapshot>>>>,
    corrupt: Arc<RwLock<HashSet<AggregateId>>>,
}

impl InMemorySnapshotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots held for an aggregate.
    #[must_use]
    pub fn count(&self, aggregate_id: &AggregateId) -> usize {
        self.snapshots
            .read()
            .unwrap()
            .get(aggregate_id)
            .map_or(0, Vec::len)
    }

    /// The highest snapshotted version for an aggregate.
    #[must_use]
    pub fn latest_version(&self, aggregate_id: &AggregateId) -> Option<Version> {
        self.snapshots
            .read()
            .unwrap()
            .get(aggregate_id)
            .and_then(|all| all.last())
            .map(|s| s.version)
    }

    /// Make `latest` report this aggregate's snapshot as corrupt.
    pub fn mark_corrupt(&self, aggregate_id: AggregateId) {
        self.corrupt.write().unwrap().insert(aggregate_id);
    }

    /// Undo [`Self::mark_corrupt`].
    pub fn heal(&self, aggregate_id: &AggregateId) {
        self.corrupt.write().unwrap().remove(aggregate_id);
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(
        &self,
        snapshot: Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<(), SnapshotError>> + Send + '_>> {
        Box::pin(async move {
            let mut snapshots = self.snapshots.write().unwrap();
            let all = snapshots.entry(snapshot.aggregate_id.clone()).or_default();
            all.retain(|s| s.version != snapshot.version);
            all.push(snapshot);
            all.sort_by_key(|s| s.version);
            Ok(())
        })
    }

    fn latest(
        &self,
        aggregate_id: AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>, SnapshotError>> + Send + '_>>
    {
        Box::pin(async move {
            if self.corrupt.read().unwrap().contains(&aggregate_id) {
                let version = self
                    .latest_version(&aggregate_id)
                    .unwrap_or(Version::NONE);
                return Err(SnapshotError::Corrupt {
                    aggregate_id,
                    version,
                    reason: "injected corruption".to_string(),
                });
            }
            Ok(self
                .snapshots
                .read()
                .unwrap()
                .get(&aggregate_id)
                .and_then(|all| all.last())
                .cloned())
        })
    }
}
