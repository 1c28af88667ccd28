//! Origin fall-back: fetch values missing from every cache layer.
//!
//! Requests are grouped by cache name (each group shares one origin
//! endpoint) and the groups fetch concurrently under a per-call bound of
//! eight in-flight HTTP requests. A group that cannot be fetched (unknown
//! cache, disabled origin, network error, non-2xx) surfaces whole as
//! `skipped`: the caller can then distinguish "no data yet" from an
//! authoritative "no data ever" and leave the retry to the client.

pub mod fetcher;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::registry::CacheRegistry;
use crate::metrics;
use crate::types::{LayerResult, ResolvedCacheEntry, ResolvedCacheHit, ResolvedCacheId};

pub use fetcher::{HttpBatchFetcher, OriginError};

/// Maximum concurrent origin HTTP requests per `get_all` call.
const MAX_PARALLEL: usize = 8;

#[derive(Debug, Clone)]
pub struct OriginService {
    fetcher: HttpBatchFetcher,
    registry: Arc<CacheRegistry>,
}

impl OriginService {
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        Self {
            fetcher: HttpBatchFetcher::new(),
            registry,
        }
    }

    /// Fetch every id from its cache's origin, at most [`MAX_PARALLEL`]
    /// requests in flight. Result order across groups is unspecified.
    pub async fn get_all(&self, reqs: &[ResolvedCacheId]) -> LayerResult {
        if reqs.is_empty() {
            return LayerResult::default();
        }

        let grouped = group_by_cache(reqs);
        let semaphore = Arc::new(Semaphore::new(MAX_PARALLEL));

        let group_futures = grouped.into_iter().map(|(cache_name, group)| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return LayerResult::all_skipped(group),
                };
                self.handle_group(&cache_name, group).await
            }
        });

        let mut final_result = LayerResult::default();
        for result in futures::future::join_all(group_futures).await {
            final_result.merge(result);
        }
        final_result
    }

    /// Fetch one cache's group and classify the response.
    async fn handle_group(&self, cache_name: &str, group: Vec<ResolvedCacheId>) -> LayerResult {
        let origin = match self.registry.origin(cache_name) {
            Ok(origin) => origin,
            Err(e) => {
                warn!(cache = cache_name, error = %e, "origin lookup failed");
                return LayerResult::all_skipped(group);
            }
        };
        if !origin.enabled {
            debug!(cache = cache_name, "origin disabled, skipping group");
            return LayerResult::all_skipped(group);
        }

        let keys: Vec<String> = group.iter().map(|r| r.id.key.clone()).collect();

        let start = Instant::now();
        let response = self.fetcher.fetch(&keys, origin).await;
        metrics::record_external_request(cache_name, response.is_ok(), start.elapsed());

        match response {
            Ok(values) => classify(group, &values),
            Err(e) => {
                warn!(cache = cache_name, error = %e, "origin fetch failed");
                LayerResult::all_skipped(group)
            }
        }
    }
}

/// Split hits from misses against the origin's response map.
fn classify(
    group: Vec<ResolvedCacheId>,
    values: &HashMap<String, Box<serde_json::value::RawValue>>,
) -> LayerResult {
    let mut result = LayerResult::default();
    for resolved in group {
        match values.get(&resolved.id.key) {
            Some(value) => result.hits.push(ResolvedCacheHit {
                entry: ResolvedCacheEntry {
                    resolved,
                    value: value.clone(),
                },
                found: true,
            }),
            None => result.misses.push(resolved),
        }
    }
    result
}

fn group_by_cache(reqs: &[ResolvedCacheId]) -> HashMap<String, Vec<ResolvedCacheId>> {
    let mut grouped: HashMap<String, Vec<ResolvedCacheId>> = HashMap::new();
    for req in reqs {
        grouped
            .entry(req.id.cache_name.clone())
            .or_default()
            .push(req.clone());
    }
    grouped
}
