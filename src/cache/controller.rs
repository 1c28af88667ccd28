//! Layer controller: top-down traversal over the ordered service list.
//!
//! ```text
//! ┌──────────────┐
//! │  client      │
//! └─────┬────────┘
//!       ↓
//! ┌──────────────┐
//! │ level 0      │  hits: {1}   misses: {2,3,4}  skipped: {5}
//! └─────┬────────┘
//!       ↓
//! ┌──────────────┐
//! │ level 1      │  hits: {2,3} misses: {4}      skipped: {5}
//! └─────┬────────┘
//!       ↓
//! ┌──────────────┐
//! │ level 2      │  hits: {4,5} misses: {}       skipped: {}
//! └──────────────┘
//! ```
//!
//! Hits are terminal; misses and skipped cascade, so each tier sees only the
//! keys the tiers above could not resolve. A tier that errors contributes no
//! hits and forwards its input unchanged; reclassifying its keys as misses
//! would pollute the tail-layer misses that drive the origin fetch.

use tracing::warn;

use crate::cache::service::LayerService;
use crate::metrics;
use crate::types::{LayerResult, ResolvedCacheEntry, ResolvedCacheId};

#[derive(Debug)]
pub struct LayerController {
    services: Vec<LayerService>,
}

impl LayerController {
    pub fn new(services: Vec<LayerService>) -> Self {
        Self { services }
    }

    /// Number of layers in the hierarchy.
    pub fn layer_count(&self) -> usize {
        self.services.len()
    }

    /// Traverse every tier top-down, returning one partition per tier.
    pub async fn get_all(&self, reqs: &[ResolvedCacheId]) -> Vec<LayerResult> {
        let mut results = Vec::with_capacity(self.services.len());
        let mut remaining = reqs.to_vec();
        for (level, service) in self.services.iter().enumerate() {
            match service.get_all(&remaining).await {
                Ok(result) => {
                    metrics::record_cache_layer(level, result.hits.len(), result.misses.len());
                    let mut next = Vec::with_capacity(result.misses.len() + result.skipped.len());
                    next.extend(result.misses.iter().cloned());
                    next.extend(result.skipped.iter().cloned());
                    results.push(result);
                    remaining = next;
                }
                Err(e) => {
                    warn!(layer = level, error = %e, "layer unavailable");
                    metrics::record_cache_layer(level, 0, remaining.len());
                    results.push(LayerResult::all_skipped(remaining.clone()));
                }
            }
        }
        results
    }

    /// Write entries to tiers `0..=bound_level`. Writes are best-effort and
    /// independent; a failing tier is logged and the rest still receive the
    /// batch.
    pub async fn put_all(&self, entries: &[ResolvedCacheEntry], bound_level: usize) {
        for (level, service) in self.services.iter().enumerate() {
            if level > bound_level {
                break;
            }
            if let Err(e) = service.put_all(entries).await {
                warn!(layer = level, error = %e, "layer unavailable");
            }
        }
    }

    /// Write entries to every tier.
    pub async fn put_all_to_all_levels(&self, entries: &[ResolvedCacheEntry]) {
        if self.services.is_empty() {
            return;
        }
        self.put_all(entries, self.services.len() - 1).await;
    }

    /// Delete ids from every tier unconditionally. Eviction stays thorough
    /// even while some tiers are down; a missed eviction risks stale data.
    pub async fn delete_all(&self, reqs: &[ResolvedCacheId]) {
        for (level, service) in self.services.iter().enumerate() {
            if let Err(e) = service.delete_all(reqs).await {
                warn!(layer = level, error = %e, "layer unavailable");
            }
        }
    }

    /// Close every tier's provider.
    pub async fn close(&self) {
        for service in &self.services {
            service.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::value::RawValue;

    use super::*;
    use crate::cache::provider::CacheProvider;
    use crate::cache::providers::RecordingProvider;
    use crate::config::registry::CacheRegistry;
    use crate::config::Config;
    use crate::types::CacheId;

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
layers:
  - name: l0
    mode: enabled
  - name: l1
    mode: enabled
caches:
  - name: users
    prefix: usr
    layers:
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

    fn entry(key: &str, value: &str) -> ResolvedCacheEntry {
        ResolvedCacheEntry {
            resolved: resolved(key),
            value: RawValue::from_string(value.to_string()).expect("valid json"),
        }
    }

    fn two_layer_controller() -> (RecordingProvider, RecordingProvider, LayerController) {
        let registry = registry();
        let l0 = RecordingProvider::new();
        let l1 = RecordingProvider::new();
        let controller = LayerController::new(vec![
            LayerService::active(
                CacheProvider::Recording(l0.clone()),
                registry.clone(),
                0,
            ),
            LayerService::active(CacheProvider::Recording(l1.clone()), registry, 1),
        ]);
        (l0, l1, controller)
    }

    #[tokio::test]
    async fn hits_short_circuit_descent() {
        let (l0, l1, controller) = two_layer_controller();
        l0.seed("usr:1", "1");
        l1.seed("usr:2", "2");

        let results = controller
            .get_all(&[resolved("1"), resolved("2"), resolved("3")])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].hits.len(), 1);
        assert_eq!(results[0].misses.len(), 2);
        // Level 1 only saw what level 0 missed.
        assert_eq!(results[1].len(), 2);
        assert_eq!(results[1].hits.len(), 1);
        assert_eq!(results[1].misses.len(), 1);
        assert_eq!(results[1].misses[0].storage_key, "usr:3");
    }

    #[tokio::test]
    async fn erroring_layer_passes_input_through() {
        let (l0, l1, controller) = two_layer_controller();
        l0.set_failing(true);
        l1.seed("usr:1", "1");

        let reqs = vec![resolved("1"), resolved("2")];
        let results = controller.get_all(&reqs).await;

        assert!(results[0].hits.is_empty());
        assert!(results[0].misses.is_empty());
        assert_eq!(results[0].skipped.len(), 2);
        // The failing layer forwarded its full input unchanged.
        assert_eq!(results[1].len(), 2);
        assert_eq!(results[1].hits.len(), 1);
    }

    #[tokio::test]
    async fn put_respects_bound_level() {
        let (l0, l1, controller) = two_layer_controller();

        controller.put_all(&[entry("1", "1")], 0).await;
        assert_eq!(l0.value("usr:1").as_deref(), Some("1"));
        assert_eq!(l1.value("usr:1"), None);

        controller.put_all_to_all_levels(&[entry("2", "2")]).await;
        assert_eq!(l0.value("usr:2").as_deref(), Some("2"));
        assert_eq!(l1.value("usr:2").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn put_survives_failing_layer() {
        let (l0, l1, controller) = two_layer_controller();
        l0.set_failing(true);

        controller.put_all_to_all_levels(&[entry("1", "1")]).await;
        // The failure at level 0 did not stop the write to level 1.
        assert_eq!(l1.value("usr:1").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn delete_hits_every_layer_once() {
        let (l0, l1, controller) = two_layer_controller();
        l0.seed("usr:1", "1");
        l1.seed("usr:1", "1");

        controller.delete_all(&[resolved("1")]).await;

        assert_eq!(l0.delete_calls(), 1);
        assert_eq!(l1.delete_calls(), 1);
        assert_eq!(l0.value("usr:1"), None);
        assert_eq!(l1.value("usr:1"), None);
    }
}
