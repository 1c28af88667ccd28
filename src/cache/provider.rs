//! Cache provider enum dispatch.
//!
//! The sealed variant over the heterogeneous backends. Enum dispatch keeps
//! provider calls free of vtable indirection and lets the compiler inline
//! the per-backend methods; downstream code only sees the uniform batched
//! contract.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cache::errors::CacheResult;
use crate::cache::providers::{LmdbProvider, MemoryProvider, RedisProvider};
use crate::config::ProviderConfig;
use crate::metrics;

#[cfg(any(test, feature = "test-utils"))]
use crate::cache::providers::RecordingProvider;

/// One entry of a batched write: canonical key, compacted value bytes, and
/// the TTL resolved from per-cache policy (`None` = no expiry).
#[derive(Debug, Clone)]
pub struct PutEntry {
    pub key: String,
    pub value: String,
    pub ttl: Option<Duration>,
}

/// Sealed set of storage backends behind one batched contract.
#[derive(Debug, Clone)]
pub enum CacheProvider {
    /// In-process TinyLFU cache.
    Memory(MemoryProvider),
    /// Remote KV over a multiplexed connection (boxed to reduce enum size).
    Redis(Box<RedisProvider>),
    /// Local persistent KV.
    Lmdb(LmdbProvider),
    /// Test-only instrumented provider.
    #[cfg(any(test, feature = "test-utils"))]
    Recording(RecordingProvider),
}

impl CacheProvider {
    /// Construct the variant selected by the tagged provider config.
    /// Construction failures are fatal at startup.
    pub async fn from_config(config: &ProviderConfig) -> CacheResult<Self> {
        let provider = match config {
            ProviderConfig::Memory(c) => Self::Memory(MemoryProvider::from_config(c)),
            ProviderConfig::Redis(c) => {
                Self::Redis(Box::new(RedisProvider::from_config(c).await?))
            }
            ProviderConfig::Lmdb(c) => Self::Lmdb(LmdbProvider::open(c)?),
        };
        debug!(
            provider = provider.provider_name(),
            name = config.name(),
            "cache provider initialized"
        );
        Ok(provider)
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
            Self::Lmdb(_) => "lmdb",
            #[cfg(any(test, feature = "test-utils"))]
            Self::Recording(_) => "recording",
        }
    }

    /// Fetch the stored values for `keys`. Absent keys are simply missing
    /// from the returned map.
    pub async fn batch_get(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let start = Instant::now();
        let result = match self {
            Self::Memory(p) => p.batch_get(keys).await,
            Self::Redis(p) => p.batch_get(keys).await,
            Self::Lmdb(p) => p.batch_get(keys).await,
            #[cfg(any(test, feature = "test-utils"))]
            Self::Recording(p) => p.batch_get(keys).await,
        };
        metrics::record_provider_op(self.provider_name(), "get", result.is_ok(), start.elapsed());
        result
    }

    /// Store every entry with its TTL in one batched write.
    pub async fn batch_put(&self, entries: &[PutEntry]) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        let result = match self {
            Self::Memory(p) => p.batch_put(entries).await,
            Self::Redis(p) => p.batch_put(entries).await,
            Self::Lmdb(p) => p.batch_put(entries).await,
            #[cfg(any(test, feature = "test-utils"))]
            Self::Recording(p) => p.batch_put(entries).await,
        };
        metrics::record_provider_op(self.provider_name(), "put", result.is_ok(), start.elapsed());
        result
    }

    /// Remove every key in one batched delete.
    pub async fn batch_delete(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        let result = match self {
            Self::Memory(p) => p.batch_delete(keys).await,
            Self::Redis(p) => p.batch_delete(keys).await,
            Self::Lmdb(p) => p.batch_delete(keys).await,
            #[cfg(any(test, feature = "test-utils"))]
            Self::Recording(p) => p.batch_delete(keys).await,
        };
        metrics::record_provider_op(
            self.provider_name(),
            "delete",
            result.is_ok(),
            start.elapsed(),
        );
        result
    }

    /// Release backend resources. Idempotent.
    pub async fn close(&self) {
        match self {
            Self::Memory(p) => p.close().await,
            Self::Redis(p) => p.close().await,
            Self::Lmdb(p) => p.close().await,
            #[cfg(any(test, feature = "test-utils"))]
            Self::Recording(p) => p.close().await,
        }
    }
}
