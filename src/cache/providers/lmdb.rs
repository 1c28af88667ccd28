//! Persistent cache provider backed by LMDB (heed).
//!
//! Two named databases inside one environment:
//!
//! - `data`: storage key -> value bytes (the payload);
//! - `ttl`:  storage key -> expiry timestamp, unix millis as big-endian i64.
//!
//! Keys past their expiry are treated as absent. Dead pairs are removed two
//! ways: lazily during `batch_get` (expired keys encountered by a read are
//! deleted best-effort) and by a background sweeper that periodically scans
//! the `ttl` database and hard-deletes pairs no read has touched. The sweeper
//! stops when the provider is closed.
//!
//! LMDB transactions are synchronous, so every operation runs under
//! `spawn_blocking`. Long loops check the closed flag every 100 keys.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::provider::PutEntry;
use crate::config::LmdbProviderConfig;

const DATA_DB_NAME: &str = "data";
const TTL_DB_NAME: &str = "ttl";

/// Closed-flag check interval inside blocking loops.
const CHECK_INTERVAL: usize = 100;

struct Inner {
    env: Env,
    data: Database<Bytes, Bytes>,
    ttl: Database<Bytes, Bytes>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Inner {
    fn ensure_open(&self) -> CacheResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(CacheError::Backend("lmdb provider is closed".to_string()));
        }
        Ok(())
    }
}

/// LMDB-backed cache service.
#[derive(Debug, Clone)]
pub struct LmdbProvider {
    inner: Arc<Inner>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl LmdbProvider {
    /// Open (or create) the environment and spawn the TTL sweeper.
    pub fn open(config: &LmdbProviderConfig) -> CacheResult<Self> {
        std::fs::create_dir_all(&config.path)
            .map_err(|e| CacheError::Connection(format!("failed to create lmdb dir: {e}")))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(&config.path)
        }
        .map_err(|e| CacheError::Connection(format!("failed to open lmdb env: {e}")))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| CacheError::Backend(format!("lmdb txn: {e}")))?;
        let data: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(DATA_DB_NAME))
            .map_err(|e| CacheError::Connection(format!("failed to open data db: {e}")))?;
        let ttl: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(TTL_DB_NAME))
            .map_err(|e| CacheError::Connection(format!("failed to open ttl db: {e}")))?;
        wtxn.commit()
            .map_err(|e| CacheError::Backend(format!("lmdb txn: {e}")))?;

        debug!(
            path = %config.path.display(),
            max_size_mb = config.max_size_mb,
            "lmdb cache provider opened"
        );

        let provider = Self {
            inner: Arc::new(Inner {
                env,
                data,
                ttl,
                closed: AtomicBool::new(false),
            }),
            sweeper: Arc::new(Mutex::new(None)),
        };
        provider.start_sweeper(Duration::from_secs(config.ttl_sweep_interval_seconds.max(1)));
        Ok(provider)
    }

    pub async fn batch_get(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let inner = self.inner.clone();
        let keys: Vec<String> = keys.to_vec();

        let (result, expired) = tokio::task::spawn_blocking(move || {
            let now = now_millis();
            let rtxn = inner
                .env
                .read_txn()
                .map_err(|e| CacheError::Backend(format!("lmdb txn: {e}")))?;

            let mut result = HashMap::with_capacity(keys.len());
            let mut expired = Vec::new();
            for (i, key) in keys.iter().enumerate() {
                if i % CHECK_INTERVAL == 0 {
                    inner.ensure_open()?;
                }
                if is_expired(&inner, &rtxn, key.as_bytes(), now)? {
                    expired.push(key.clone());
                    continue;
                }
                if let Some(bytes) = inner
                    .data
                    .get(&rtxn, key.as_bytes())
                    .map_err(|e| CacheError::Backend(format!("lmdb get: {e}")))?
                {
                    result.insert(key.clone(), String::from_utf8_lossy(bytes).into_owned());
                }
            }
            Ok::<_, CacheError>((result, expired))
        })
        .await
        .map_err(|e| CacheError::Backend(format!("lmdb task failed: {e}")))??;

        if !expired.is_empty() {
            // Lazy cleanup; a failure here only delays the sweeper.
            if let Err(e) = self.batch_delete(&expired).await {
                debug!(error = %e, "lazy expiry cleanup failed");
            }
        }

        Ok(result)
    }

    pub async fn batch_put(&self, entries: &[PutEntry]) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let inner = self.inner.clone();
        let entries: Vec<PutEntry> = entries.to_vec();

        tokio::task::spawn_blocking(move || {
            let now = now_millis();
            let mut wtxn = inner
                .env
                .write_txn()
                .map_err(|e| CacheError::Backend(format!("lmdb txn: {e}")))?;

            for (i, entry) in entries.iter().enumerate() {
                if i % CHECK_INTERVAL == 0 {
                    inner.ensure_open()?;
                }
                let key = entry.key.as_bytes();
                inner
                    .data
                    .put(&mut wtxn, key, entry.value.as_bytes())
                    .map_err(|e| CacheError::Backend(format!("lmdb put: {e}")))?;
                match entry.ttl {
                    Some(ttl) => {
                        let expires_at = now + ttl.as_millis() as i64;
                        inner
                            .ttl
                            .put(&mut wtxn, key, &expires_at.to_be_bytes())
                            .map_err(|e| CacheError::Backend(format!("lmdb put: {e}")))?;
                    }
                    None => {
                        // Clear any expiry left behind by a previous write.
                        inner
                            .ttl
                            .delete(&mut wtxn, key)
                            .map_err(|e| CacheError::Backend(format!("lmdb delete: {e}")))?;
                    }
                }
            }

            wtxn.commit()
                .map_err(|e| CacheError::Backend(format!("lmdb txn: {e}")))?;
            Ok::<_, CacheError>(())
        })
        .await
        .map_err(|e| CacheError::Backend(format!("lmdb task failed: {e}")))?
    }

    pub async fn batch_delete(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let inner = self.inner.clone();
        let keys: Vec<String> = keys.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut wtxn = inner
                .env
                .write_txn()
                .map_err(|e| CacheError::Backend(format!("lmdb txn: {e}")))?;

            for (i, key) in keys.iter().enumerate() {
                if i % CHECK_INTERVAL == 0 {
                    inner.ensure_open()?;
                }
                let key = key.as_bytes();
                inner
                    .data
                    .delete(&mut wtxn, key)
                    .map_err(|e| CacheError::Backend(format!("lmdb delete: {e}")))?;
                inner
                    .ttl
                    .delete(&mut wtxn, key)
                    .map_err(|e| CacheError::Backend(format!("lmdb delete: {e}")))?;
            }

            wtxn.commit()
                .map_err(|e| CacheError::Backend(format!("lmdb txn: {e}")))?;
            Ok::<_, CacheError>(())
        })
        .await
        .map_err(|e| CacheError::Backend(format!("lmdb task failed: {e}")))?
    }

    /// Stop the sweeper and reject further operations. The environment
    /// flushes when the last clone drops.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
        let handle = self
            .sweeper
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    fn start_sweeper(&self, interval: Duration) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate tick
            loop {
                ticker.tick().await;
                if inner.closed.load(Ordering::Relaxed) {
                    return;
                }
                let sweep_inner = inner.clone();
                let swept =
                    tokio::task::spawn_blocking(move || sweep_once(&sweep_inner)).await;
                match swept {
                    Ok(Ok(removed)) if removed > 0 => {
                        debug!(removed, "ttl sweep removed expired entries");
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "ttl sweep failed"),
                    Err(e) => warn!(error = %e, "ttl sweep task failed"),
                }
            }
        });
        if let Ok(mut guard) = self.sweeper.lock() {
            *guard = Some(handle);
        }
    }
}

/// One sweep pass: scan the ttl database and hard-delete expired pairs.
fn sweep_once(inner: &Inner) -> CacheResult<u64> {
    let now = now_millis();

    let rtxn = inner
        .env
        .read_txn()
        .map_err(|e| CacheError::Backend(format!("lmdb txn: {e}")))?;
    let mut dead = Vec::new();
    let iter = inner
        .ttl
        .iter(&rtxn)
        .map_err(|e| CacheError::Backend(format!("lmdb iter: {e}")))?;
    for (i, item) in iter.enumerate() {
        if i % CHECK_INTERVAL == 0 && inner.closed.load(Ordering::Relaxed) {
            return Ok(0);
        }
        let (key, value) = item.map_err(|e| CacheError::Backend(format!("lmdb iter: {e}")))?;
        if now > decode_millis(value) {
            dead.push(key.to_vec());
        }
    }
    drop(rtxn);

    if dead.is_empty() {
        return Ok(0);
    }

    let mut wtxn = inner
        .env
        .write_txn()
        .map_err(|e| CacheError::Backend(format!("lmdb txn: {e}")))?;
    let mut removed = 0u64;
    for key in &dead {
        inner
            .data
            .delete(&mut wtxn, key)
            .map_err(|e| CacheError::Backend(format!("lmdb delete: {e}")))?;
        if inner
            .ttl
            .delete(&mut wtxn, key)
            .map_err(|e| CacheError::Backend(format!("lmdb delete: {e}")))?
        {
            removed += 1;
        }
    }
    wtxn.commit()
        .map_err(|e| CacheError::Backend(format!("lmdb txn: {e}")))?;
    Ok(removed)
}

fn is_expired(
    inner: &Inner,
    rtxn: &heed::RoTxn<'_>,
    key: &[u8],
    now: i64,
) -> CacheResult<bool> {
    match inner
        .ttl
        .get(rtxn, key)
        .map_err(|e| CacheError::Backend(format!("lmdb get: {e}")))?
    {
        Some(bytes) => Ok(now > decode_millis(bytes)),
        None => Ok(false),
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Big-endian i64 unix millis; short values decode as already expired.
fn decode_millis(bytes: &[u8]) -> i64 {
    match <[u8; 8]>::try_from(bytes) {
        Ok(arr) => i64::from_be_bytes(arr),
        Err(_) => i64::MIN,
    }
}
