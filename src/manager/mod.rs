//! Cache manager: the read/write/evict pipelines.
//!
//! `get_all` drives the full read path: resolve the batch, traverse the
//! layer stack, fetch the deepest layer's misses from the origin, then
//! promote values upward in a background back-fill so future reads hit
//! higher in the hierarchy.

pub mod adapter;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::LayerController;
use crate::origin::OriginService;
use crate::resolver::Resolver;
use crate::types::{
    CacheEntry, CacheEntryHit, CacheId, LayerResult, ResolvedCacheEntry, ResolvedCacheHit,
};

pub use adapter::AsyncAdapter;

/// Budget for one back-fill pass. Partial back-fill is acceptable; the next
/// read of the same keys repeats the promotion.
const BACKFILL_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug)]
pub struct CacheManager {
    resolver: Resolver,
    controller: Arc<LayerController>,
    origin: OriginService,
}

impl CacheManager {
    pub fn new(resolver: Resolver, controller: Arc<LayerController>, origin: OriginService) -> Self {
        Self {
            resolver,
            controller,
            origin,
        }
    }

    /// Resolve, traverse the layers, fall back to the origin for tail-layer
    /// misses, and schedule the back-fill. The returned hits are unordered;
    /// the HTTP boundary re-aligns them to the request.
    pub async fn get_all(&self, ids: &[CacheId]) -> Vec<CacheEntryHit> {
        debug!(ids = ids.len(), "manager get_all");

        let resolved = self.resolver.resolve_ids(ids);
        let layer_results = self.controller.get_all(&resolved).await;

        let Some(tail) = layer_results.last() else {
            return Vec::new();
        };

        let layer_hits: Vec<ResolvedCacheHit> = layer_results
            .iter()
            .flat_map(|r| r.hits.iter().cloned())
            .collect();

        if !tail.misses.is_empty() {
            debug!(misses = tail.misses.len(), "fetching from origin");
        }
        let origin_result = self.origin.get_all(&tail.misses).await;
        let origin_hits = origin_result.hits;

        let mut final_hits = layer_hits.clone();
        final_hits.extend(origin_hits.iter().cloned());

        let controller = self.controller.clone();
        adapter::spawn_bounded("backfill", BACKFILL_TIMEOUT, async move {
            fill_missing_levels(controller, layer_hits, origin_hits, layer_results).await;
        })
        .await;

        self.resolver.lift_hits(final_hits)
    }

    /// Write entries through every layer.
    pub async fn put_all(&self, entries: &[CacheEntry]) {
        let resolved = self.resolver.resolve_entries(entries);
        self.controller.put_all_to_all_levels(&resolved).await;
    }

    /// Evict ids from every layer.
    pub async fn evict_all(&self, ids: &[CacheId]) {
        let resolved = self.resolver.resolve_ids(ids);
        self.controller.delete_all(&resolved).await;
    }
}

/// Promote values to the layers that missed them.
///
/// For an id hit at layer `j`, every layer above `j` that reported it as a
/// miss is back-filled; the layers at and below the hit site receive no new
/// write. Because misses cascade, the deepest miss level for such an id is
/// `j - 1`, so one bounded write at that level covers exactly the span
/// `0..j`. Layers that reported an outage listed their keys as skipped, not
/// missed, and are deliberately left alone. Origin hits are written through
/// the full depth: every layer missed them.
async fn fill_missing_levels(
    controller: Arc<LayerController>,
    layer_hits: Vec<ResolvedCacheHit>,
    origin_hits: Vec<ResolvedCacheHit>,
    layer_results: Vec<LayerResult>,
) {
    let hit_map: HashMap<&str, &ResolvedCacheHit> = layer_hits
        .iter()
        .map(|hit| (hit.storage_key(), hit))
        .collect();

    let mut deepest_miss: HashMap<&str, usize> = HashMap::new();
    for (level, result) in layer_results.iter().enumerate() {
        for missed in &result.misses {
            if hit_map.contains_key(missed.storage_key.as_str()) {
                deepest_miss.insert(missed.storage_key.as_str(), level);
            }
        }
    }

    let mut by_bound: BTreeMap<usize, Vec<ResolvedCacheEntry>> = BTreeMap::new();
    for (storage_key, bound) in deepest_miss {
        if let Some(hit) = hit_map.get(storage_key) {
            by_bound.entry(bound).or_default().push(hit.entry.clone());
        }
    }
    for (bound, entries) in by_bound {
        controller.put_all(&entries, bound).await;
    }

    if !origin_hits.is_empty() {
        let entries: Vec<ResolvedCacheEntry> =
            origin_hits.into_iter().map(|hit| hit.entry).collect();
        controller.put_all_to_all_levels(&entries).await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::value::RawValue;

    use super::*;
    use crate::cache::provider::CacheProvider;
    use crate::cache::providers::RecordingProvider;
    use crate::cache::LayerService;
    use crate::config::registry::CacheRegistry;
    use crate::config::Config;
    use crate::types::ResolvedCacheId;

    fn registry() -> Arc<CacheRegistry> {
        let config: Config = serde_yaml::from_str(
            r#"
providers:
  - name: l0
    type: memory
    max_capacity: 10
  - name: l1
    type: memory
    max_capacity: 10
  - name: l2
    type: memory
    max_capacity: 10
layers:
  - name: l0
    mode: enabled
  - name: l1
    mode: enabled
  - name: l2
    mode: enabled
caches:
  - name: users
    prefix: usr
    layers:
      - { enabled: true, ttl_seconds: 0 }
      - { enabled: true, ttl_seconds: 0 }
      - { enabled: true, ttl_seconds: 0 }
"#,
        )
        .expect("yaml should parse");
        CacheRegistry::new(&config)
    }

    fn resolved(key: &str) -> ResolvedCacheId {
        ResolvedCacheId {
            id: CacheId::new("users", key),
            storage_key: format!("usr:{key}"),
        }
    }

    fn hit(key: &str, value: &str) -> ResolvedCacheHit {
        ResolvedCacheHit {
            entry: ResolvedCacheEntry {
                resolved: resolved(key),
                value: RawValue::from_string(value.to_string()).expect("valid json"),
            },
            found: true,
        }
    }

    fn controller_with(
        providers: &[RecordingProvider],
    ) -> Arc<LayerController> {
        let registry = registry();
        let services = providers
            .iter()
            .enumerate()
            .map(|(level, p)| {
                LayerService::active(CacheProvider::Recording(p.clone()), registry.clone(), level)
            })
            .collect();
        Arc::new(LayerController::new(services))
    }

    #[tokio::test]
    async fn deep_hit_promotes_to_every_miss_layer_above() {
        let providers = [
            RecordingProvider::new(),
            RecordingProvider::new(),
            RecordingProvider::new(),
        ];
        let controller = controller_with(&providers);

        // "x" was hit at level 2, so it sits in the miss lists of levels 0
        // and 1.
        let layer_results = vec![
            LayerResult {
                misses: vec![resolved("x")],
                ..LayerResult::default()
            },
            LayerResult {
                misses: vec![resolved("x")],
                ..LayerResult::default()
            },
            LayerResult {
                hits: vec![hit("x", "1")],
                ..LayerResult::default()
            },
        ];

        fill_missing_levels(
            controller,
            vec![hit("x", "1")],
            Vec::new(),
            layer_results,
        )
        .await;

        assert_eq!(providers[0].value("usr:x").as_deref(), Some("1"));
        assert_eq!(providers[1].value("usr:x").as_deref(), Some("1"));
        // Never written at or below the hit site.
        assert_eq!(providers[2].put_calls(), 0);
    }

    #[tokio::test]
    async fn hit_one_level_down_backfills_the_top() {
        let providers = [
            RecordingProvider::new(),
            RecordingProvider::new(),
            RecordingProvider::new(),
        ];
        let controller = controller_with(&providers);

        // "x" missed at level 0 and was hit at level 1.
        let layer_results = vec![
            LayerResult {
                misses: vec![resolved("x")],
                ..LayerResult::default()
            },
            LayerResult {
                hits: vec![hit("x", "1")],
                ..LayerResult::default()
            },
            LayerResult::default(),
        ];

        fill_missing_levels(
            controller,
            vec![hit("x", "1")],
            Vec::new(),
            layer_results,
        )
        .await;

        assert_eq!(providers[0].value("usr:x").as_deref(), Some("1"));
        assert_eq!(providers[1].put_calls(), 0);
        assert_eq!(providers[2].put_calls(), 0);
    }

    #[tokio::test]
    async fn origin_hits_are_written_to_every_level() {
        let providers = [
            RecordingProvider::new(),
            RecordingProvider::new(),
            RecordingProvider::new(),
        ];
        let controller = controller_with(&providers);

        let layer_results = vec![
            LayerResult {
                misses: vec![resolved("y")],
                ..LayerResult::default()
            },
            LayerResult {
                misses: vec![resolved("y")],
                ..LayerResult::default()
            },
            LayerResult {
                misses: vec![resolved("y")],
                ..LayerResult::default()
            },
        ];

        fill_missing_levels(
            controller,
            Vec::new(),
            vec![hit("y", "2")],
            layer_results,
        )
        .await;

        for provider in &providers {
            assert_eq!(provider.value("usr:y").as_deref(), Some("2"));
        }
    }

    #[tokio::test]
    async fn skipped_layers_receive_no_backfill() {
        let providers = [
            RecordingProvider::new(),
            RecordingProvider::new(),
            RecordingProvider::new(),
        ];
        let controller = controller_with(&providers);

        // Level 0 errored (its keys are skipped, not missed); the value was
        // found at level 1.
        let layer_results = vec![
            LayerResult {
                skipped: vec![resolved("z")],
                ..LayerResult::default()
            },
            LayerResult {
                hits: vec![hit("z", "3")],
                ..LayerResult::default()
            },
            LayerResult::default(),
        ];

        fill_missing_levels(
            controller,
            vec![hit("z", "3")],
            Vec::new(),
            layer_results,
        )
        .await;

        for provider in &providers {
            assert_eq!(provider.put_calls(), 0);
        }
    }
}
