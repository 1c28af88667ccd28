//! Configuration model and validation.
//!
//! One YAML document describes the whole deployment:
//!
//! ```yaml
//! server:
//!   api_port: 8080
//!   metrics_port: 9080
//! providers:
//!   - name: hot
//!     type: memory
//!     max_capacity: 100000
//!   - name: warm
//!     type: redis
//!     url: redis://localhost:6379
//!   - name: cold
//!     type: lmdb
//!     path: ./data/cache
//! layers:
//!   - name: hot
//!     mode: enabled
//!   - name: warm
//!     mode: enabled
//!   - name: cold
//!     mode: enabled
//! caches:
//!   - name: users
//!     prefix: usr
//!     layers:
//!       - { enabled: true, ttl_seconds: 60 }
//!       - { enabled: true, ttl_seconds: 300 }
//!       - { enabled: true, ttl_seconds: 0 }
//!     origin:
//!       enabled: true
//!       url: http://origin:9000/users/batch
//!       prop: ids
//!       key_type: number
//! ```
//!
//! Providers are tagged records discriminated by `type`; an unknown tag is
//! rejected during parsing. [`Config::validate`] runs the cross-entity checks
//! once at startup; violations are fatal and never rechecked at runtime.

pub mod loader;
pub mod registry;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Configuration loading or validation failure. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub providers: Vec<ProviderConfig>,
    pub layers: Vec<LayerConfig>,
    pub caches: Vec<CacheDef>,
}

/// Listener ports and async operation budgets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_port: u16,
    pub metrics_port: u16,
    pub put_all_timeout_ms: u64,
    pub evict_all_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: 8080,
            metrics_port: 9080,
            put_all_timeout_ms: 5_000,
            evict_all_timeout_ms: 5_000,
        }
    }
}

/// A concrete storage backend, discriminated by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Memory(MemoryProviderConfig),
    Redis(RedisProviderConfig),
    Lmdb(LmdbProviderConfig),
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Memory(c) => &c.name,
            Self::Redis(c) => &c.name,
            Self::Lmdb(c) => &c.name,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
            Self::Lmdb(_) => "lmdb",
        }
    }
}

/// In-process cache (moka).
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryProviderConfig {
    pub name: String,
    pub max_capacity: u64,
}

/// Remote KV cache (redis).
#[derive(Debug, Clone, Deserialize)]
pub struct RedisProviderConfig {
    pub name: String,
    pub url: String,
}

/// Local persistent KV cache (LMDB).
#[derive(Debug, Clone, Deserialize)]
pub struct LmdbProviderConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_lmdb_size_mb")]
    pub max_size_mb: usize,
    #[serde(default = "default_sweep_interval")]
    pub ttl_sweep_interval_seconds: u64,
}

fn default_lmdb_size_mb() -> usize {
    256
}

fn default_sweep_interval() -> u64 {
    60
}

/// Whether a layer participates in the hierarchy at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerMode {
    Enabled,
    Disabled,
}

/// One tier of the hierarchy: a provider reference plus its mode.
/// Order in the config is the traversal order, fastest first.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    pub mode: LayerMode,
}

/// Per-cache policy for one layer. `ttl_seconds == 0` means no expiry.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LayerPolicy {
    pub enabled: bool,
    #[serde(default)]
    pub ttl_seconds: u64,
}

impl LayerPolicy {
    /// TTL as the providers consume it: `None` for "no expiry".
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_seconds > 0).then(|| Duration::from_secs(self.ttl_seconds))
    }
}

/// How keys are encoded in the origin batch request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    Number,
}

/// Descriptor of the authoritative origin batch endpoint for one cache.
#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    /// Name of the JSON property carrying the key array in the request body.
    #[serde(default)]
    pub prop: String,
    #[serde(default = "default_key_type")]
    pub key_type: KeyType,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_origin_timeout")]
    pub timeout_seconds: u64,
}

fn default_key_type() -> KeyType {
    KeyType::String
}

fn default_origin_timeout() -> u64 {
    15
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            prop: String::new(),
            key_type: default_key_type(),
            headers: HashMap::new(),
            timeout_seconds: default_origin_timeout(),
        }
    }
}

impl OriginConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// One named cache: prefix, per-layer policy, origin descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheDef {
    pub name: String,
    pub prefix: String,
    pub layers: Vec<LayerPolicy>,
    #[serde(default)]
    pub origin: OriginConfig,
}

impl Config {
    /// Run every cross-entity invariant check. Called once after parsing;
    /// a passing config is immutable for the process lifetime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_providers()?;
        self.validate_layers()?;
        self.validate_caches()?;
        Ok(())
    }

    fn validate_providers(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for (i, p) in self.providers.iter().enumerate() {
            if p.name().is_empty() {
                return Err(invalid(format!("provider[{i}]: name is required")));
            }
            if !names.insert(p.name().to_string()) {
                return Err(invalid(format!(
                    "provider[{i}]: duplicate name '{}'",
                    p.name()
                )));
            }
            match p {
                ProviderConfig::Memory(c) => {
                    if c.max_capacity == 0 {
                        return Err(invalid(format!(
                            "provider[{i}] ({}): max_capacity must be > 0",
                            c.name
                        )));
                    }
                }
                ProviderConfig::Redis(c) => {
                    let parsed = Url::parse(&c.url).map_err(|e| {
                        invalid(format!("provider[{i}] ({}): invalid url: {e}", c.name))
                    })?;
                    if !matches!(parsed.scheme(), "redis" | "rediss") {
                        return Err(invalid(format!(
                            "provider[{i}] ({}): unsupported url scheme '{}'",
                            c.name,
                            parsed.scheme()
                        )));
                    }
                }
                ProviderConfig::Lmdb(c) => {
                    if c.path.as_os_str().is_empty() {
                        return Err(invalid(format!(
                            "provider[{i}] ({}): path is required",
                            c.name
                        )));
                    }
                    if c.max_size_mb == 0 {
                        return Err(invalid(format!(
                            "provider[{i}] ({}): max_size_mb must be > 0",
                            c.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_layers(&self) -> Result<(), ConfigError> {
        let provider_names: HashSet<&str> = self.providers.iter().map(|p| p.name()).collect();
        let mut layer_names = HashSet::new();
        for (i, l) in self.layers.iter().enumerate() {
            if l.name.is_empty() {
                return Err(invalid(format!("layer[{i}]: name is required")));
            }
            if !layer_names.insert(l.name.as_str()) {
                return Err(invalid(format!("layer[{i}]: duplicate name '{}'", l.name)));
            }
            if !provider_names.contains(l.name.as_str()) {
                return Err(invalid(format!(
                    "layer[{i}]: no matching provider found for name '{}'",
                    l.name
                )));
            }
        }
        Ok(())
    }

    fn validate_caches(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        let mut prefixes = HashSet::new();
        for (i, cache) in self.caches.iter().enumerate() {
            if cache.name.is_empty() {
                return Err(invalid(format!("cache[{i}]: name is required")));
            }
            if !names.insert(cache.name.as_str()) {
                return Err(invalid(format!(
                    "cache[{i}]: duplicate cache name '{}'",
                    cache.name
                )));
            }
            if cache.prefix.is_empty() {
                return Err(invalid(format!("cache[{i}]: prefix is required")));
            }
            if !prefixes.insert(cache.prefix.as_str()) {
                return Err(invalid(format!(
                    "cache[{i}]: duplicate prefix '{}'",
                    cache.prefix
                )));
            }
            if cache.layers.len() != self.layers.len() {
                return Err(invalid(format!(
                    "cache[{i}]: number of cache layers ({}) must match global layers ({})",
                    cache.layers.len(),
                    self.layers.len()
                )));
            }
            self.validate_origin(i, &cache.origin)?;
        }
        Ok(())
    }

    fn validate_origin(&self, i: usize, origin: &OriginConfig) -> Result<(), ConfigError> {
        if !origin.enabled {
            return Ok(());
        }
        if origin.prop.is_empty() {
            return Err(invalid(format!("cache[{i}]: origin.prop is required")));
        }
        if origin.url.is_empty() {
            return Err(invalid(format!("cache[{i}]: origin.url is required")));
        }
        let parsed = Url::parse(&origin.url).map_err(|e| {
            invalid(format!(
                "cache[{i}]: invalid origin.url '{}': {e}",
                origin.url
            ))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "cache[{i}]: unsupported scheme '{}' in origin.url",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(invalid(format!(
                "cache[{i}]: missing host in origin.url '{}'",
                origin.url
            )));
        }
        if origin.timeout_seconds == 0 {
            return Err(invalid(format!("cache[{i}]: origin.timeout must be > 0")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_yaml() -> String {
        r#"
providers:
  - name: hot
    type: memory
    max_capacity: 1000
  - name: cold
    type: lmdb
    path: /tmp/stratacache
layers:
  - name: hot
    mode: enabled
  - name: cold
    mode: enabled
caches:
  - name: users
    prefix: usr
    layers:
      - { enabled: true, ttl_seconds: 60 }
      - { enabled: true, ttl_seconds: 0 }
    origin:
      enabled: true
      url: http://origin:9000/users/batch
      prop: ids
      key_type: string
"#
        .to_string()
    }

    #[test]
    fn valid_config_passes() {
        let cfg: Config = serde_yaml::from_str(&base_yaml()).expect("yaml should parse");
        cfg.validate().expect("config should validate");
        assert_eq!(cfg.server.api_port, 8080);
        assert_eq!(cfg.caches[0].layers[0].ttl(), Some(Duration::from_secs(60)));
        assert_eq!(cfg.caches[0].layers[1].ttl(), None);
    }

    #[test]
    fn unknown_provider_type_fails_to_parse() {
        let yaml = base_yaml().replace("type: memory", "type: memcached");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn duplicate_prefix_rejected() {
        let mut cfg: Config = serde_yaml::from_str(&base_yaml()).expect("yaml should parse");
        let mut dup = cfg.caches[0].clone();
        dup.name = "orders".to_string();
        cfg.caches.push(dup);
        let err = cfg.validate().expect_err("duplicate prefix should fail");
        assert!(err.to_string().contains("duplicate prefix"));
    }

    #[test]
    fn layer_count_mismatch_rejected() {
        let mut cfg: Config = serde_yaml::from_str(&base_yaml()).expect("yaml should parse");
        cfg.caches[0].layers.pop();
        let err = cfg.validate().expect_err("layer mismatch should fail");
        assert!(err.to_string().contains("must match global layers"));
    }

    #[test]
    fn layer_without_provider_rejected() {
        let mut cfg: Config = serde_yaml::from_str(&base_yaml()).expect("yaml should parse");
        cfg.layers.push(LayerConfig {
            name: "ghost".to_string(),
            mode: LayerMode::Enabled,
        });
        for cache in &mut cfg.caches {
            cache.layers.push(LayerPolicy {
                enabled: false,
                ttl_seconds: 0,
            });
        }
        let err = cfg.validate().expect_err("missing provider should fail");
        assert!(err.to_string().contains("no matching provider"));
    }

    #[test]
    fn enabled_origin_requires_url_and_prop() {
        let mut cfg: Config = serde_yaml::from_str(&base_yaml()).expect("yaml should parse");
        cfg.caches[0].origin.url = "ftp://origin:9000".to_string();
        assert!(cfg.validate().is_err());

        cfg.caches[0].origin.url = "http://origin:9000/batch".to_string();
        cfg.caches[0].origin.prop = String::new();
        assert!(cfg.validate().is_err());

        // A disabled origin is exempt from endpoint checks.
        cfg.caches[0].origin.enabled = false;
        cfg.validate().expect("disabled origin should validate");
    }
}
