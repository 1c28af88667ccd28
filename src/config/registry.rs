//! Read-only cache registry.
//!
//! Built once from validated configuration and shared read-only across the
//! pipeline: the resolver consults it for prefixes, the layer services for
//! per-cache enable/TTL policy, and the origin service for batch endpoint
//! descriptors. Lookups are lock-free map reads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::{CacheDef, Config, LayerMode, OriginConfig, ProviderConfig};

/// Lookup failure against the registry.
///
/// Unknown caches are an expected runtime condition (clients control the
/// cache name); unknown levels indicate a wiring bug and can only surface if
/// a layer service is constructed with an out-of-range index.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cache with name {0:?} not found")]
    UnknownCache(String),

    #[error("requested wrong level {level} for cache {cache:?}")]
    UnknownLevel { cache: String, level: usize },
}

/// Immutable catalogue of named caches.
#[derive(Debug)]
pub struct CacheRegistry {
    caches: HashMap<String, CacheDef>,
    layer_count: usize,
}

impl CacheRegistry {
    pub fn new(config: &Config) -> Arc<Self> {
        let caches = config
            .caches
            .iter()
            .map(|c| (c.name.clone(), c.clone()))
            .collect();
        Arc::new(Self {
            caches,
            layer_count: config.layers.len(),
        })
    }

    /// Number of layers every cache carries policy for.
    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    pub fn cache(&self, name: &str) -> Result<&CacheDef, RegistryError> {
        self.caches
            .get(name)
            .ok_or_else(|| RegistryError::UnknownCache(name.to_string()))
    }

    /// Storage-key prefix for a cache.
    pub fn prefix(&self, name: &str) -> Result<&str, RegistryError> {
        Ok(&self.cache(name)?.prefix)
    }

    /// Whether `level` is enabled for `name`.
    pub fn is_enabled(&self, name: &str, level: usize) -> Result<bool, RegistryError> {
        Ok(self.policy(name, level)?.enabled)
    }

    /// TTL for `name` at `level`; `None` means no expiry.
    pub fn ttl(&self, name: &str, level: usize) -> Result<Option<Duration>, RegistryError> {
        Ok(self.policy(name, level)?.ttl())
    }

    /// Origin batch endpoint descriptor for a cache.
    pub fn origin(&self, name: &str) -> Result<&OriginConfig, RegistryError> {
        Ok(&self.cache(name)?.origin)
    }

    fn policy(&self, name: &str, level: usize) -> Result<super::LayerPolicy, RegistryError> {
        let cache = self.cache(name)?;
        cache
            .layers
            .get(level)
            .copied()
            .ok_or_else(|| RegistryError::UnknownLevel {
                cache: name.to_string(),
                level,
            })
    }
}

/// One layer of the hierarchy bound to its provider configuration.
#[derive(Debug, Clone)]
pub struct LayerBinding {
    pub mode: LayerMode,
    pub provider: ProviderConfig,
}

/// Pair each configured layer with its provider. Validation has already
/// guaranteed that every layer names an existing provider.
pub fn layer_bindings(config: &Config) -> Vec<LayerBinding> {
    let providers: HashMap<&str, &ProviderConfig> = config
        .providers
        .iter()
        .map(|p| (p.name(), p))
        .collect();

    config
        .layers
        .iter()
        .filter_map(|layer| {
            providers.get(layer.name.as_str()).map(|p| LayerBinding {
                mode: layer.mode,
                provider: (*p).clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        serde_yaml::from_str(
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
      - { enabled: true, ttl_seconds: 60 }
  - name: sessions
    prefix: ses
    layers:
      - { enabled: false, ttl_seconds: 0 }
"#,
        )
        .expect("yaml should parse")
    }

    #[test]
    fn lookups_resolve_policy() {
        let registry = CacheRegistry::new(&config());
        assert_eq!(registry.prefix("users").expect("prefix"), "usr");
        assert!(registry.is_enabled("users", 0).expect("enabled"));
        assert!(!registry.is_enabled("sessions", 0).expect("enabled"));
        assert_eq!(
            registry.ttl("users", 0).expect("ttl"),
            Some(Duration::from_secs(60))
        );
        assert_eq!(registry.ttl("sessions", 0).expect("ttl"), None);
    }

    #[test]
    fn unknown_cache_is_an_error() {
        let registry = CacheRegistry::new(&config());
        assert!(matches!(
            registry.prefix("ghost"),
            Err(RegistryError::UnknownCache(_))
        ));
    }

    #[test]
    fn out_of_range_level_is_an_error() {
        let registry = CacheRegistry::new(&config());
        assert!(matches!(
            registry.is_enabled("users", 5),
            Err(RegistryError::UnknownLevel { level: 5, .. })
        ));
    }

    #[test]
    fn bindings_follow_layer_order() {
        let bindings = layer_bindings(&config());
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].provider.name(), "hot");
        assert_eq!(bindings[0].mode, LayerMode::Enabled);
    }
}
