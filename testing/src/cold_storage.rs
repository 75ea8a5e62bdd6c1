//! In-memory cold storage with failure injection.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use ledger_stream_core::archive::{ColdStorage, ColdStorageError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory archive destination.
///
/// `set_fail_puts` makes every write fail, and `overwrite` tampers with a
/// stored blob, so archival tests can prove the export-verify-drop
/// sequence never drops a partition after a failed or unverifiable
/// export.
#[derive(Clone, Debug, Default)]
pub struct InMemoryColdStorage {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    fail_puts: Arc<AtomicBool>,
}

impl InMemoryColdStorage {
    /// Create an empty destination.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail (or stop doing so).
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Replace a stored blob with arbitrary bytes.
    pub fn overwrite(&self, key: &str, bytes: Vec<u8>) {
        self.objects.write().unwrap().insert(key.to_string(), bytes);
    }

    /// Keys of every stored object, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().unwrap().is_empty()
    }
}

impl ColdStorage for InMemoryColdStorage {
    fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ColdStorageError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            if self.fail_puts.load(Ordering::SeqCst) {
                return Err(ColdStorageError::Backend("injected put failure".to_string()));
            }
            self.objects.write().unwrap().insert(key, bytes);
            Ok(())
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, ColdStorageError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            self.objects
                .read()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or(ColdStorageError::NotFound(key))
        })
    }
}
