//! In-memory projection store with real token CAS semantics.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};
use ledger_stream_core::projection::{
    ProjectionError, ProjectionRecord, ProjectionStore, Result, VersionToken,
};
use ledger_stream_core::stream::AggregateId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory projection storage.
///
/// Implements the token compare-and-swap exactly: `update` fails with
/// [`ProjectionError::TokenMismatch`] when another writer bumped the token
/// first, `insert` fails with [`ProjectionError::AlreadyExists`] on a lost
/// creation race, and `replace` overwrites unconditionally while still
/// bumping the token.
#[derive(Clone, Debug, Default)]
pub struct InMemoryProjectionStore {
    data: Arc<RwLock<HashMap<AggregateId, ProjectionRecord>>>,
    injected_conflicts: Arc<AtomicUsize>,
}

impl InMemoryProjectionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored projections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    /// Whether a projection exists for the aggregate.
    #[must_use]
    pub fn contains(&self, aggregate_id: &AggregateId) -> bool {
        self.data.read().unwrap().contains_key(aggregate_id)
    }

    /// Remove every projection (test isolation).
    pub fn clear(&self) {
        self.data.write().unwrap().clear();
    }

    /// Make the next `count` calls to `update` fail with
    /// [`ProjectionError::TokenMismatch`], as if a concurrent writer bumped
    /// the token between the caller's load and its write.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ProjectionStore for InMemoryProjectionStore {
    fn load(
        &self,
        aggregate_id: AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProjectionRecord>>> + Send + '_>> {
        Box::pin(async move { Ok(self.data.read().unwrap().get(&aggregate_id).cloned()) })
    }

    fn insert(
        &self,
        mut record: ProjectionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<VersionToken>> + Send + '_>> {
        Box::pin(async move {
            let mut data = self.data.write().unwrap();
            if data.contains_key(&record.aggregate_id) {
                return Err(ProjectionError::AlreadyExists(record.aggregate_id));
            }
            record.version_token = VersionToken::INITIAL;
            let token = record.version_token;
            data.insert(record.aggregate_id.clone(), record);
            Ok(token)
        })
    }

    fn update(
        &self,
        mut record: ProjectionRecord,
        expected_token: VersionToken,
    ) -> Pin<Box<dyn Future<Output = Result<VersionToken>> + Send + '_>> {
        Box::pin(async move {
            let mut data = self.data.write().unwrap();
            let stored = data.get(&record.aggregate_id).ok_or_else(|| {
                ProjectionError::Storage(format!(
                    "update of missing projection {}",
                    record.aggregate_id
                ))
            })?;
            if stored.version_token != expected_token {
                return Err(ProjectionError::TokenMismatch {
                    aggregate_id: record.aggregate_id,
                    expected: expected_token,
                    actual: stored.version_token,
                });
            }
            if self.take_injected_conflict() {
                return Err(ProjectionError::TokenMismatch {
                    aggregate_id: record.aggregate_id,
                    expected: expected_token,
                    actual: expected_token.next(),
                });
            }
            record.version_token = stored.version_token.next();
            let token = record.version_token;
            data.insert(record.aggregate_id.clone(), record);
            Ok(token)
        })
    }

    fn replace(
        &self,
        mut record: ProjectionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<VersionToken>> + Send + '_>> {
        Box::pin(async move {
            let mut data = self.data.write().unwrap();
            record.version_token = data
                .get(&record.aggregate_id)
                .map_or(VersionToken::INITIAL, |stored| stored.version_token.next());
            let token = record.version_token;
            data.insert(record.aggregate_id.clone(), record);
            Ok(token)
        })
    }

    fn aggregate_ids(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AggregateId>>> + Send + '_>> {
        Box::pin(async move {
            let mut ids: Vec<AggregateId> =
                self.data.read().unwrap().keys().cloned().collect();
            ids.sort();
            Ok(ids)
        })
    }

    fn record_access(
        &self,
        aggregate_id: AggregateId,
        at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut data = self.data.write().unwrap();
            if let Some(record) = data.get_mut(&aggregate_id) {
                record.access_count += 1;
                record.last_accessed_at = Some(at);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledger_stream_core::stream::Version;

    fn record(id: &str) -> ProjectionRecord {
        ProjectionRecord::empty(AggregateId::new(id), vec![0])
    }

    #[tokio::test]
    async fn insert_then_load() {
        let store = InMemoryProjectionStore::new();
        let token = store.insert(record("acct-1")).await.unwrap();
        assert_eq!(token, VersionToken::INITIAL);

        let loaded = store.load(AggregateId::new("acct-1")).await.unwrap().unwrap();
        assert_eq!(loaded.version_token, VersionToken::INITIAL);
    }

    #[tokio::test]
    async fn double_insert_loses_the_race() {
        let store = InMemoryProjectionStore::new();
        store.insert(record("acct-1")).await.unwrap();
        let result = store.insert(record("acct-1")).await;
        assert!(matches!(result, Err(ProjectionError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn update_with_stale_token_fails() {
        let store = InMemoryProjectionStore::new();
        let token = store.insert(record("acct-1")).await.unwrap();

        let mut updated = record("acct-1");
        updated.last_event_version = Version::FIRST;
        let bumped = store.update(updated.clone(), token).await.unwrap();
        assert_eq!(bumped, token.next());

        // Second writer still holding the original token.
        let result = store.update(updated, token).await;
        assert!(matches!(
            result,
            Err(ProjectionError::TokenMismatch { expected, actual, .. })
                if expected == token && actual == bumped
        ));
    }

    #[tokio::test]
    async fn injected_conflicts_fail_updates_then_clear() {
        let store = InMemoryProjectionStore::new();
        let token = store.insert(record("acct-1")).await.unwrap();
        store.inject_conflicts(2);

        let mut updated = record("acct-1");
        updated.last_event_version = Version::FIRST;
        for _ in 0..2 {
            let result = store.update(updated.clone(), token).await;
            assert!(matches!(result, Err(ProjectionError::TokenMismatch { .. })));
        }

        // The budget is spent; the same write now goes through.
        let bumped = store.update(updated, token).await.unwrap();
        assert_eq!(bumped, token.next());
    }

    #[tokio::test]
    async fn replace_bumps_the_token() {
        let store = InMemoryProjectionStore::new();
        let token = store.insert(record("acct-1")).await.unwrap();
        let replaced = store.replace(record("acct-1")).await.unwrap();
        assert_eq!(replaced, token.next());
    }

    #[tokio::test]
    async fn aggregate_ids_are_sorted() {
        let store = InMemoryProjectionStore::new();
        for id in ["acct-3", "acct-1", "acct-2"] {
            store.insert(record(id)).await.unwrap();
        }
        let ids = store.aggregate_ids().await.unwrap();
        let names: Vec<&str> = ids.iter().map(AggregateId::as_str).collect();
        assert_eq!(names, vec!["acct-1", "acct-2", "acct-3"]);
    }

    #[tokio::test]
    async fn record_access_bumps_statistics() {
        let store = InMemoryProjectionStore::new();
        store.insert(record("acct-1")).await.unwrap();

        let at = Utc::now();
        store.record_access(AggregateId::new("acct-1"), at).await.unwrap();
        store.record_access(AggregateId::new("acct-1"), at).await.unwrap();

        let loaded = store.load(AggregateId::new("acct-1")).await.unwrap().unwrap();
        assert_eq!(loaded.access_count, 2);
        assert_eq!(loaded.last_accessed_at, Some(at));

        // Missing projections are a silent no-op.
        store.record_access(AggregateId::new("ghost"), at).await.unwrap();
    }
}
