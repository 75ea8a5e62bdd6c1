//! Materialized projections and the optimistic-concurrency store seam.
//!
//! A [`ProjectionRecord`] is the current materialized state for one
//! aggregate: serialized domain state plus the bookkeeping the engine
//! needs (`last_event_version` for idempotent folds, a [`VersionToken`]
//! for compare-and-swap writes, and access statistics for hot-key
//! policies).
//!
//! Projections are mutated exclusively through the CAS path
//! ([`ProjectionStore::update`]) by the live updater, or wholesale through
//! [`ProjectionStore::replace`] by the rebuild coordinator. There is no
//! in-place patching and no long-held lock; contention is resolved by
//! retry.
//!
//! The [`ProjectionFold`] trait is the pure `(state, event) -> state` seam
//! that both the live path and the rebuild path share, which is what makes
//! "rebuild reproduces incremental application" a testable property rather
//! than a hope.

use crate::event::EventRecord;
use crate::stream::{AggregateId, Version};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Error type for projection operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Compare-and-swap failed: another writer changed the record since it
    /// was read.
    #[error("Token mismatch for {aggregate_id}: expected {expected}, found {actual}")]
    TokenMismatch {
        /// The contended aggregate.
        aggregate_id: AggregateId,
        /// The token the writer read.
        expected: VersionToken,
        /// The token currently stored.
        actual: VersionToken,
    },

    /// Insert attempted for an aggregate that already has a projection.
    #[error("Projection already exists for {0}")]
    AlreadyExists(AggregateId),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Folding an event into state failed.
    #[error("Fold error: {0}")]
    Fold(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Opaque optimistic-concurrency token; changes on every successful write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(u64);

impl VersionToken {
    /// Token of a freshly inserted record.
    pub const INITIAL: Self = Self(1);

    /// The token after one more successful write.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current materialized state for one aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRecord {
    /// The aggregate this projection belongs to.
    pub aggregate_id: AggregateId,
    /// Bincode-serialized domain state.
    pub state: Vec<u8>,
    /// Version of the last event folded in; only ever increases.
    pub last_event_version: Version,
    /// Optimistic-concurrency token; bumped by the store on every write.
    pub version_token: VersionToken,
    /// Number of recorded accesses.
    pub access_count: u64,
    /// When the projection was last read, if ever.
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl ProjectionRecord {
    /// An empty projection for an aggregate with no events folded yet.
    #[must_use]
    pub fn empty(aggregate_id: AggregateId, state: Vec<u8>) -> Self {
        Self {
            aggregate_id,
            state,
            last_event_version: Version::NONE,
            version_token: VersionToken::INITIAL,
            access_count: 0,
            last_accessed_at: None,
        }
    }
}

/// Storage for materialized projections, keyed by aggregate ID.
///
/// # Write paths
///
/// - [`ProjectionStore::insert`] creates the record for a new aggregate.
/// - [`ProjectionStore::update`] is the CAS path used by the live updater.
/// - [`ProjectionStore::replace`] is the unconditional overwrite used only
///   by the rebuild coordinator.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the engine can hold
/// `Arc<dyn ProjectionStore>` dependencies.
pub trait ProjectionStore: Send + Sync {
    /// Load the projection for an aggregate, or `None` if it has none yet.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn load(
        &self,
        aggregate_id: AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProjectionRecord>>> + Send + '_>>;

    /// Insert a projection for an aggregate that has none.
    ///
    /// The store assigns [`VersionToken::INITIAL`].
    ///
    /// # Errors
    ///
    /// - [`ProjectionError::AlreadyExists`]: another writer inserted first
    ///   (re-read and go through [`ProjectionStore::update`])
    /// - [`ProjectionError::Storage`]: backend failure
    fn insert(
        &self,
        record: ProjectionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<VersionToken>> + Send + '_>>;

    /// Compare-and-swap update: writes `record` only if the stored token
    /// still equals `expected_token`, bumping the token on success.
    ///
    /// # Errors
    ///
    /// - [`ProjectionError::TokenMismatch`]: another writer won the race
    ///   (reload and retry)
    /// - [`ProjectionError::Storage`]: backend failure
    fn update(
        &self,
        record: ProjectionRecord,
        expected_token: VersionToken,
    ) -> Pin<Box<dyn Future<Output = Result<VersionToken>> + Send + '_>>;

    /// Unconditionally overwrite the projection (rebuild only).
    ///
    /// Still bumps the token so concurrent CAS writers lose their race
    /// against the replaced record.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn replace(
        &self,
        record: ProjectionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<VersionToken>> + Send + '_>>;

    /// IDs of every aggregate with a projection, sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn aggregate_ids(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AggregateId>>> + Send + '_>>;

    /// Bump the access statistics for an aggregate's projection.
    ///
    /// A missing projection is a no-op, not an error; reads can race
    /// creation.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn record_access(
        &self,
        aggregate_id: AggregateId,
        at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Pure fold of one event into projection state.
///
/// Implementations must be deterministic functions of `(state, event)`:
/// no clocks, no randomness, no I/O. The rebuild coordinator relies on
/// this to reproduce the live path's output bit for bit.
pub trait ProjectionFold: Send + Sync {
    /// The domain state this fold maintains.
    type State: Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Fold `event` into `state`, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Fold`] if the event's payload cannot be
    /// decoded or is invalid for this fold.
    fn fold(&self, state: Self::State, event: &EventRecord) -> Result<Self::State>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_mismatch_display() {
        let error = ProjectionError::TokenMismatch {
            aggregate_id: AggregateId::new("acct-1"),
            expected: VersionToken::INITIAL,
            actual: VersionToken::INITIAL.next(),
        };
        let display = format!("{error}");
        assert!(display.contains("acct-1"));
        assert!(display.contains("expected 1"));
        assert!(display.contains("found 2"));
    }

    #[test]
    fn empty_record_has_no_version() {
        let record = ProjectionRecord::empty(AggregateId::new("acct-1"), vec![]);
        assert!(record.last_event_version.is_none());
        assert_eq!(record.version_token, VersionToken::INITIAL);
        assert_eq!(record.access_count, 0);
    }

    #[test]
    fn tokens_advance() {
        let token = VersionToken::INITIAL;
        assert_ne!(token, token.next());
        assert_eq!(format!("{}", token.next()), "2");
    }
}
