//! Per-layer cache service.
//!
//! One service instance fronts one tier of the hierarchy. The active variant
//! applies per-cache enable/TTL policy from the registry and batches provider
//! I/O; the disabled variant passes every request through as skipped so a
//! tier can be turned off in configuration without touching callers.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::value::RawValue;
use tracing::warn;

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::provider::{CacheProvider, PutEntry};
use crate::config::registry::{CacheRegistry, LayerBinding};
use crate::config::LayerMode;
use crate::types::{
    LayerResult, ResolvedCacheEntry, ResolvedCacheHit, ResolvedCacheId,
};

/// One tier of the cache hierarchy.
#[derive(Debug)]
pub enum LayerService {
    Active(ActiveLayer),
    Disabled,
}

/// Active tier: provider handle plus the policy source and its level index.
#[derive(Debug)]
pub struct ActiveLayer {
    provider: CacheProvider,
    registry: Arc<CacheRegistry>,
    level: usize,
}

/// Build the ordered service list from layer bindings. A binding in
/// `disabled` mode yields the disabled variant without constructing its
/// provider.
pub async fn build_layer_services(
    bindings: &[LayerBinding],
    registry: Arc<CacheRegistry>,
) -> CacheResult<Vec<LayerService>> {
    let mut services = Vec::with_capacity(bindings.len());
    for (level, binding) in bindings.iter().enumerate() {
        if binding.mode == LayerMode::Disabled {
            services.push(LayerService::Disabled);
            continue;
        }
        let provider = CacheProvider::from_config(&binding.provider)
            .await
            .map_err(|e| {
                CacheError::Connection(format!(
                    "failed to create service for provider index {level} (name: {}): {e}",
                    binding.provider.name()
                ))
            })?;
        services.push(LayerService::active(provider, registry.clone(), level));
    }
    Ok(services)
}

impl LayerService {
    pub fn active(provider: CacheProvider, registry: Arc<CacheRegistry>, level: usize) -> Self {
        Self::Active(ActiveLayer {
            provider,
            registry,
            level,
        })
    }

    /// Partition `reqs` into hits, misses and skipped for this tier.
    ///
    /// A provider failure surfaces as an error so the controller can treat
    /// the whole tier as pass-through; silently reporting misses here would
    /// let lower tiers mask an outage.
    pub async fn get_all(&self, reqs: &[ResolvedCacheId]) -> CacheResult<LayerResult> {
        match self {
            Self::Disabled => Ok(LayerResult::all_skipped(reqs.to_vec())),
            Self::Active(layer) => layer.get_all(reqs).await,
        }
    }

    /// Write every entry whose cache has this tier enabled. Entries for
    /// disabled caches are ignored, not reported.
    pub async fn put_all(&self, entries: &[ResolvedCacheEntry]) -> CacheResult<()> {
        match self {
            Self::Disabled => Ok(()),
            Self::Active(layer) => layer.put_all(entries).await,
        }
    }

    /// Delete every id whose cache has this tier enabled.
    pub async fn delete_all(&self, reqs: &[ResolvedCacheId]) -> CacheResult<()> {
        match self {
            Self::Disabled => Ok(()),
            Self::Active(layer) => layer.delete_all(reqs).await,
        }
    }

    pub async fn close(&self) {
        if let Self::Active(layer) = self {
            layer.provider.close().await;
        }
    }
}

impl ActiveLayer {
    async fn get_all(&self, reqs: &[ResolvedCacheId]) -> CacheResult<LayerResult> {
        let (key_to_req, enabled_keys, skipped) = self.categorize(reqs);
        if enabled_keys.is_empty() {
            return Ok(LayerResult {
                skipped,
                ..LayerResult::default()
            });
        }

        let values = self
            .provider
            .batch_get(&enabled_keys)
            .await
            .map_err(|e| CacheError::Backend(format!("batch get error: {e}")))?;

        let mut hits = Vec::with_capacity(enabled_keys.len());
        let mut misses = Vec::with_capacity(enabled_keys.len());
        for key in &enabled_keys {
            let Some(req) = key_to_req.get(key.as_str()) else {
                continue;
            };
            match values.get(key) {
                Some(value) => match RawValue::from_string(value.clone()) {
                    Ok(raw) => hits.push(ResolvedCacheHit {
                        entry: ResolvedCacheEntry {
                            resolved: (*req).clone(),
                            value: raw,
                        },
                        found: true,
                    }),
                    Err(e) => {
                        // A corrupt stored value is indistinguishable from
                        // absence for the caller.
                        warn!(key = %key, error = %e, "stored value is not valid JSON");
                        misses.push((*req).clone());
                    }
                },
                None => misses.push((*req).clone()),
            }
        }

        Ok(LayerResult {
            hits,
            misses,
            skipped,
        })
    }

    async fn put_all(&self, entries: &[ResolvedCacheEntry]) -> CacheResult<()> {
        let mut batch = Vec::with_capacity(entries.len());
        for entry in entries {
            let cache_name = &entry.resolved.id.cache_name;
            let enabled = match self.registry.is_enabled(cache_name, self.level) {
                Ok(enabled) => enabled,
                Err(e) => {
                    warn!(
                        key = %entry.storage_key(),
                        error = %e,
                        "cannot check if level is enabled"
                    );
                    continue;
                }
            };
            if !enabled {
                continue;
            }
            let ttl = match self.registry.ttl(cache_name, self.level) {
                Ok(ttl) => ttl,
                Err(e) => {
                    warn!(key = %entry.storage_key(), error = %e, "cannot get ttl");
                    continue;
                }
            };
            batch.push(PutEntry {
                key: entry.storage_key().to_string(),
                value: compact_json(entry.value.get()),
                ttl,
            });
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.provider.batch_put(&batch).await
    }

    async fn delete_all(&self, reqs: &[ResolvedCacheId]) -> CacheResult<()> {
        let (_, keys, _) = self.categorize(reqs);
        if keys.is_empty() {
            return Ok(());
        }
        self.provider.batch_delete(&keys).await
    }

    /// Split requests by per-cache policy for this level. Requests whose
    /// policy cannot be resolved are logged and omitted.
    fn categorize<'a>(
        &self,
        reqs: &'a [ResolvedCacheId],
    ) -> (
        HashMap<&'a str, &'a ResolvedCacheId>,
        Vec<String>,
        Vec<ResolvedCacheId>,
    ) {
        let mut key_to_req = HashMap::with_capacity(reqs.len());
        let mut enabled_keys = Vec::with_capacity(reqs.len());
        let mut skipped = Vec::new();
        for req in reqs {
            match self.registry.is_enabled(&req.id.cache_name, self.level) {
                Ok(true) => {
                    key_to_req.insert(req.storage_key.as_str(), req);
                    enabled_keys.push(req.storage_key.clone());
                }
                Ok(false) => skipped.push(req.clone()),
                Err(e) => {
                    warn!(
                        key = %req.storage_key,
                        error = %e,
                        "cannot check if level is enabled"
                    );
                }
            }
        }
        (key_to_req, enabled_keys, skipped)
    }
}

/// Strip insignificant whitespace from a JSON document without reparsing it,
/// preserving object key order and number formatting exactly.
pub fn compact_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in raw.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ' ' | '\t' | '\n' | '\r' => {}
            _ => out.push(c),
        }
    }
    out
}
