//! Read-through cache seam for warmed projections.
//!
//! The cache warmer pre-loads the hottest projections into this namespace
//! so the read path can serve them without touching the projection store.
//! Entries expire by TTL; the warmer refreshes them on its own schedule.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache backend error.
    #[error("Cache error: {0}")]
    Backend(String),
}

/// Key/value cache with per-entry TTL.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the engine can hold
/// `Arc<dyn ProjectionCache>` dependencies.
pub trait ProjectionCache: Send + Sync {
    /// Store an entry that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] on backend failure.
    fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;

    /// Fetch an entry; expired entries read as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] on backend failure.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + '_>>;

    /// Purge the whole warm-cache namespace.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] on backend failure.
    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;
}
