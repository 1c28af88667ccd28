//! YAML configuration loading.
//!
//! The config path is resolved from the `--config` flag, falling back to the
//! `STRATACACHE_CONFIG` environment variable and finally to
//! `config/stratacache.yaml` relative to the working directory.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Config, ConfigError};

/// Default location when neither the flag nor the env var is set.
pub const DEFAULT_CONFIG_PATH: &str = "config/stratacache.yaml";

/// Environment variable overriding the config location.
pub const CONFIG_PATH_ENV: &str = "STRATACACHE_CONFIG";

/// Resolve the effective config path.
pub fn resolve_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Read, parse and validate the configuration at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading configuration");

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let config: Config = serde_yaml::from_str(&raw)?;
    config.validate()?;

    info!(
        path = %path.display(),
        providers = config.providers.len(),
        layers = config.layers.len(),
        caches = config.caches.len(),
        "configuration loaded"
    );

    Ok(config)
}
