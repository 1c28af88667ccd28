//! Key resolution between wire identities and canonical storage keys.
//!
//! Resolution is fail-open: an id referencing an unknown cache is dropped
//! from the batch and logged instead of aborting the whole request; one bad
//! cache name must not poison a large batch. The caller observes dropped ids
//! as misses. Output order follows input order among surviving items.

use std::sync::Arc;

use tracing::warn;

use crate::config::registry::CacheRegistry;
use crate::types::{
    CacheEntry, CacheEntryHit, CacheId, ResolvedCacheEntry, ResolvedCacheHit, ResolvedCacheId,
};

/// Separator between a cache prefix and the application key.
pub const STORAGE_KEY_SEPARATOR: &str = ":";

#[derive(Debug, Clone)]
pub struct Resolver {
    registry: Arc<CacheRegistry>,
}

impl Resolver {
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve ids for a read or delete. Unknown caches are dropped.
    pub fn resolve_ids(&self, ids: &[CacheId]) -> Vec<ResolvedCacheId> {
        ids.iter()
            .filter_map(|id| match self.storage_key(id) {
                Ok(storage_key) => Some(ResolvedCacheId {
                    id: id.clone(),
                    storage_key,
                }),
                Err(e) => {
                    warn!(cache = %id.cache_name, key = %id.key, error = %e, "dropping id");
                    None
                }
            })
            .collect()
    }

    /// Resolve entries for a write. Unknown caches are dropped.
    pub fn resolve_entries(&self, entries: &[CacheEntry]) -> Vec<ResolvedCacheEntry> {
        entries
            .iter()
            .filter_map(|entry| {
                let id = entry.id();
                match self.storage_key(&id) {
                    Ok(storage_key) => Some(ResolvedCacheEntry {
                        resolved: ResolvedCacheId {
                            id,
                            storage_key,
                        },
                        value: entry.value.clone(),
                    }),
                    Err(e) => {
                        warn!(
                            cache = %entry.cache_name,
                            key = %entry.key,
                            error = %e,
                            "dropping entry"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Lift resolved hits back to the wire shape, preserving cache identity.
    pub fn lift_hits(&self, hits: Vec<ResolvedCacheHit>) -> Vec<CacheEntryHit> {
        hits.into_iter()
            .map(|hit| CacheEntryHit {
                cache_name: hit.entry.resolved.id.cache_name.clone(),
                key: hit.entry.resolved.id.key.clone(),
                value: Some(hit.entry.value),
                found: hit.found,
            })
            .collect()
    }

    fn storage_key(&self, id: &CacheId) -> Result<String, crate::config::registry::RegistryError> {
        let prefix = self.registry.prefix(&id.cache_name)?;
        Ok(format!("{prefix}{STORAGE_KEY_SEPARATOR}{}", id.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn resolver() -> Resolver {
        let config: Config = serde_yaml::from_str(
            r#"
providers:
  - name: hot
    type: memory
    max_capacity: 10
layers:
  - name: hot
    mode: enabled
caches:
  - name: users
    prefix: usr
    layers:
      - { enabled: true, ttl_seconds: 0 }
  - name: orders
    prefix: ord
    layers:
      - { enabled: true, ttl_seconds: 0 }
"#,
        )
        .expect("yaml should parse");
        Resolver::new(CacheRegistry::new(&config))
    }

    #[test]
    fn unknown_cache_is_dropped_not_fatal() {
        let resolver = resolver();
        let resolved = resolver.resolve_ids(&[
            CacheId::new("users", "1"),
            CacheId::new("ghost", "2"),
            CacheId::new("users", "3"),
        ]);
        assert_eq!(
            resolved
                .iter()
                .map(|r| r.storage_key.as_str())
                .collect::<Vec<_>>(),
            vec!["usr:1", "usr:3"]
        );
    }

    #[test]
    fn distinct_caches_never_collide() {
        let resolver = resolver();
        let resolved = resolver.resolve_ids(&[
            CacheId::new("users", "42"),
            CacheId::new("orders", "42"),
        ]);
        assert_ne!(resolved[0].storage_key, resolved[1].storage_key);
    }

    #[test]
    fn lift_preserves_identity() {
        let resolver = resolver();
        let resolved = resolver.resolve_entries(&[serde_json::from_str(
            r#"{"c":"users","k":"1","v":{"a":1}}"#,
        )
        .expect("entry should parse")]);
        let hits = resolver.lift_hits(
            resolved
                .into_iter()
                .map(|entry| crate::types::ResolvedCacheHit { entry, found: true })
                .collect(),
        );
        assert_eq!(hits[0].cache_name, "users");
        assert_eq!(hits[0].key, "1");
        assert!(hits[0].found);
        assert_eq!(hits[0].value.as_ref().map(|v| v.get()), Some(r#"{"a":1}"#));
    }
}
