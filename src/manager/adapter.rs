//! Async manager adapter: the concurrency envelope around the manager.
//!
//! Reads pass straight through. Writes and evictions are fire-and-forget:
//! the method returns as soon as the work is scheduled on the bounded
//! runner. Callers' request contexts are never propagated into the spawned
//! tasks; the work may outlive the HTTP response, so each task gets a
//! fresh timeout of its own.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use once_cell::sync::Lazy;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::manager::CacheManager;
use crate::types::{CacheEntry, CacheEntryHit, CacheId};

/// Process-wide cap on concurrently running async tasks (writes, evictions
/// and read-path back-fills all share it).
pub const MAX_ASYNC_TASKS: usize = 64;

/// Applied when a configured timeout is zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

static ASYNC_TASKS: Lazy<Arc<Semaphore>> =
    Lazy::new(|| Arc::new(Semaphore::new(MAX_ASYNC_TASKS)));

/// Number of free slots on the shared runner. Exposed for tests.
pub fn available_async_slots() -> usize {
    ASYNC_TASKS.available_permits()
}

/// Run `fut` on the shared bounded runner under its own deadline.
///
/// Blocks the caller only while waiting for a free slot; the work itself
/// runs detached. A panic inside the task is caught and logged; one bad
/// write must not take the process down.
pub(crate) async fn spawn_bounded<F>(name: &'static str, limit: Duration, fut: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let permit = match ASYNC_TASKS.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return, // semaphore closed, process is shutting down
    };

    tokio::spawn(async move {
        let _permit = permit;
        info!(name, "async started");
        match AssertUnwindSafe(tokio::time::timeout(limit, fut))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => info!(name, "async finished"),
            Ok(Err(_)) => warn!(name, timeout_ms = limit.as_millis() as u64, "async timed out"),
            Err(panic) => error!(name, panic = panic_message(panic.as_ref()), "async panic"),
        }
    });
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

/// Public façade over [`CacheManager`].
#[derive(Debug, Clone)]
pub struct AsyncAdapter {
    manager: Arc<CacheManager>,
    put_all_timeout: Duration,
    evict_all_timeout: Duration,
}

impl AsyncAdapter {
    /// Non-positive timeouts fall back to [`DEFAULT_TIMEOUT`].
    pub fn new(manager: Arc<CacheManager>, put_timeout: Duration, evict_timeout: Duration) -> Self {
        let put_all_timeout = if put_timeout.is_zero() {
            warn!(default_ms = DEFAULT_TIMEOUT.as_millis() as u64, "put_all timeout unset");
            DEFAULT_TIMEOUT
        } else {
            put_timeout
        };
        let evict_all_timeout = if evict_timeout.is_zero() {
            warn!(default_ms = DEFAULT_TIMEOUT.as_millis() as u64, "evict_all timeout unset");
            DEFAULT_TIMEOUT
        } else {
            evict_timeout
        };
        Self {
            manager,
            put_all_timeout,
            evict_all_timeout,
        }
    }

    /// Synchronous read pass-through.
    pub async fn get_all(&self, ids: &[CacheId]) -> Vec<CacheEntryHit> {
        self.manager.get_all(ids).await
    }

    /// Single-id convenience over [`Self::get_all`].
    pub async fn get(&self, id: &CacheId) -> Option<CacheEntryHit> {
        self.manager
            .get_all(std::slice::from_ref(id))
            .await
            .into_iter()
            .next()
    }

    /// Schedule a write-through of `entries` to every layer and return.
    pub async fn put_all(&self, entries: Vec<CacheEntry>) {
        if entries.is_empty() {
            return;
        }
        let manager = self.manager.clone();
        spawn_bounded("put_all", self.put_all_timeout, async move {
            manager.put_all(&entries).await;
        })
        .await;
    }

    /// Single-entry convenience over [`Self::put_all`].
    pub async fn put(&self, entry: CacheEntry) {
        self.put_all(vec![entry]).await;
    }

    /// Schedule an eviction of `ids` from every layer and return.
    pub async fn evict_all(&self, ids: Vec<CacheId>) {
        if ids.is_empty() {
            return;
        }
        let manager = self.manager.clone();
        spawn_bounded("evict_all", self.evict_all_timeout, async move {
            manager.evict_all(&ids).await;
        })
        .await;
    }

    /// Single-id convenience over [`Self::evict_all`].
    pub async fn evict(&self, id: CacheId) {
        self.evict_all(vec![id]).await;
    }
}
