//! In-memory TTL cache driven by an injected clock.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ledger_stream_core::cache::{CacheError, ProjectionCache};
use ledger_stream_core::clock::Clock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Clone, Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// In-memory key/value cache with clock-based TTL.
///
/// Expiry is evaluated against the injected [`Clock`], so tests advance a
/// `ManualClock` instead of sleeping.
#[derive(Clone)]
pub struct InMemoryCache {
    clock: Arc<dyn Clock>,
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    /// Create an empty cache reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the cache holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Whether an unexpired entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap()
            .get(key)
            .is_some_and(|entry| entry.expires_at > self.clock.now())
    }
}

impl ProjectionCache for InMemoryCache {
    fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let ttl = ChronoDuration::from_std(ttl)
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            let entry = Entry {
                value,
                expires_at: self.clock.now() + ttl,
            };
            self.entries.write().unwrap().insert(key, entry);
            Ok(())
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let now = self.clock.now();
            let mut entries = self.entries.write().unwrap();
            match entries.get(&key) {
                Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
                Some(_) => {
                    entries.remove(&key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        Box::pin(async move {
            self.entries.write().unwrap().clear();
            Ok(())
        })
    }
}
