//! In-memory cache provider backed by moka.
//!
//! Fills the fastest slot of the hierarchy: an in-process TinyLFU cache with
//! per-entry TTLs. Entries carry their own TTL so a single cache instance can
//! serve many logical caches with different policies; `None` means the entry
//! never expires.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use moka::Expiry;
use tracing::debug;

use crate::cache::errors::CacheResult;
use crate::cache::provider::PutEntry;
use crate::config::MemoryProviderConfig;

/// Long batch loops yield back to the runtime this often so a dropped
/// (cancelled) caller is observed promptly.
const YIELD_INTERVAL: usize = 100;

#[derive(Clone)]
struct StoredValue {
    value: String,
    ttl: Option<Duration>,
}

/// Reads the TTL stored alongside each value; moka applies it per entry.
struct PerEntryExpiry;

impl Expiry<String, StoredValue> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// In-memory cache service.
#[derive(Clone)]
pub struct MemoryProvider {
    cache: moka::future::Cache<String, StoredValue>,
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProvider")
            .field("max_capacity", &self.cache.policy().max_capacity())
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MemoryProvider {
    pub fn from_config(config: &MemoryProviderConfig) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryExpiry)
            .build();

        debug!(
            max_capacity = config.max_capacity,
            "memory cache provider created"
        );

        Self { cache }
    }

    /// Shorthand constructor for tests.
    pub fn new(max_capacity: u64) -> Self {
        Self::from_config(&MemoryProviderConfig {
            name: "memory".to_string(),
            max_capacity,
        })
    }

    pub async fn batch_get(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        let mut result = HashMap::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            if i % YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
            if let Some(stored) = self.cache.get(key).await {
                result.insert(key.clone(), stored.value);
            }
        }
        Ok(result)
    }

    pub async fn batch_put(&self, entries: &[PutEntry]) -> CacheResult<()> {
        for (i, entry) in entries.iter().enumerate() {
            if i % YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
            self.cache
                .insert(
                    entry.key.clone(),
                    StoredValue {
                        value: entry.value.clone(),
                        ttl: entry.ttl,
                    },
                )
                .await;
        }
        Ok(())
    }

    pub async fn batch_delete(&self, keys: &[String]) -> CacheResult<()> {
        for (i, key) in keys.iter().enumerate() {
            if i % YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
            self.cache.invalidate(key).await;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}
