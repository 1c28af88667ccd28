//! Test-only provider that records calls and can be made to fail.
//!
//! Backs the behavioral assertions the real providers cannot support:
//! counting batch invocations per operation, inspecting stored values, and
//! simulating a layer outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::provider::PutEntry;

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicUsize,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

/// In-memory map provider with call counters and a failure switch.
/// TTLs are recorded but never enforced.
#[derive(Debug, Clone, Default)]
pub struct RecordingProvider {
    store: Arc<Mutex<HashMap<String, (String, Option<Duration>)>>>,
    counters: Arc<Counters>,
    failing: Arc<AtomicBool>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation return a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.counters.gets.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.counters.puts.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.counters.deletes.load(Ordering::SeqCst)
    }

    /// Stored value for a storage key, if any.
    pub fn value(&self, key: &str) -> Option<String> {
        self.store
            .lock()
            .ok()
            .and_then(|store| store.get(key).map(|(v, _)| v.clone()))
    }

    /// Recorded TTL for a storage key (`None` = stored without expiry).
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        self.store
            .lock()
            .ok()
            .and_then(|store| store.get(key).map(|(_, ttl)| *ttl))
    }

    pub fn entry_count(&self) -> usize {
        self.store.lock().map(|store| store.len()).unwrap_or(0)
    }

    /// Seed a value directly, bypassing the counters.
    pub fn seed(&self, key: &str, value: &str) {
        if let Ok(mut store) = self.store.lock() {
            store.insert(key.to_string(), (value.to_string(), None));
        }
    }

    /// Remove a value directly, bypassing the counters.
    pub fn remove(&self, key: &str) {
        if let Ok(mut store) = self.store.lock() {
            store.remove(key);
        }
    }

    fn check_failing(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("simulated provider outage".to_string()));
        }
        Ok(())
    }

    pub async fn batch_get(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let store = self
            .store
            .lock()
            .map_err(|_| CacheError::Backend("store lock poisoned".to_string()))?;
        Ok(keys
            .iter()
            .filter_map(|k| store.get(k).map(|(v, _)| (k.clone(), v.clone())))
            .collect())
    }

    pub async fn batch_put(&self, entries: &[PutEntry]) -> CacheResult<()> {
        self.counters.puts.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let mut store = self
            .store
            .lock()
            .map_err(|_| CacheError::Backend("store lock poisoned".to_string()))?;
        for entry in entries {
            store.insert(entry.key.clone(), (entry.value.clone(), entry.ttl));
        }
        Ok(())
    }

    pub async fn batch_delete(&self, keys: &[String]) -> CacheResult<()> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let mut store = self
            .store
            .lock()
            .map_err(|_| CacheError::Backend("store lock poisoned".to_string()))?;
        for key in keys {
            store.remove(key);
        }
        Ok(())
    }

    pub async fn close(&self) {}
}
