//! Wire and pipeline data model.
//!
//! External (wire) types carry the compact field names of the batch API
//! (`c`, `k`, `v`, `f`). Internal types pair each identity with the storage
//! key it resolves to, so the cache layers and the origin fetcher never
//! consult the registry for key construction again.
//!
//! Lifecycles:
//! - GET:    `CacheId` -> `ResolvedCacheId` -> `ResolvedCacheHit` -> `CacheEntryHit`
//! - PUT:    `CacheEntry` -> `ResolvedCacheEntry`
//! - DELETE: `CacheId` -> `ResolvedCacheId`

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Identity of one cached value as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheId {
    /// Logical cache namespace, e.g. `users`.
    #[serde(rename = "c")]
    pub cache_name: String,
    /// Application-level key within the cache.
    #[serde(rename = "k")]
    pub key: String,
}

impl CacheId {
    pub fn new(cache_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            key: key.into(),
        }
    }
}

/// Identity plus payload, the unit of a batch PUT.
///
/// The value is kept as raw JSON so payload bytes travel through the
/// pipeline unparsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "c")]
    pub cache_name: String,
    #[serde(rename = "k")]
    pub key: String,
    #[serde(rename = "v")]
    pub value: Box<RawValue>,
}

impl CacheEntry {
    pub fn id(&self) -> CacheId {
        CacheId::new(self.cache_name.clone(), self.key.clone())
    }
}

/// One slot of a batch GET response. `found == false` carries a null value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryHit {
    #[serde(rename = "c")]
    pub cache_name: String,
    #[serde(rename = "k")]
    pub key: String,
    #[serde(rename = "v")]
    pub value: Option<Box<RawValue>>,
    #[serde(rename = "f")]
    pub found: bool,
}

impl CacheEntryHit {
    /// The shape returned for ids the pipeline produced no hit for.
    pub fn not_found(id: &CacheId) -> Self {
        Self {
            cache_name: id.cache_name.clone(),
            key: id.key.clone(),
            value: None,
            found: false,
        }
    }
}

/// A `CacheId` together with the canonical provider key it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCacheId {
    pub id: CacheId,
    /// `<prefix>:<key>`, the sole key namespace every provider sees.
    pub storage_key: String,
}

/// A resolved identity together with its raw JSON value.
#[derive(Debug, Clone)]
pub struct ResolvedCacheEntry {
    pub resolved: ResolvedCacheId,
    pub value: Box<RawValue>,
}

impl ResolvedCacheEntry {
    pub fn storage_key(&self) -> &str {
        &self.resolved.storage_key
    }
}

/// Outcome of a lookup for one resolved id.
#[derive(Debug, Clone)]
pub struct ResolvedCacheHit {
    pub entry: ResolvedCacheEntry,
    pub found: bool,
}

impl ResolvedCacheHit {
    pub fn storage_key(&self) -> &str {
        self.entry.storage_key()
    }
}

/// Per-layer partition of a batch read.
///
/// Invariant: `hits`, `misses` and `skipped` are disjoint and together cover
/// the layer's input; each sequence preserves the input order of its members.
#[derive(Debug, Clone, Default)]
pub struct LayerResult {
    /// Ids whose value the layer returned.
    pub hits: Vec<ResolvedCacheHit>,
    /// Ids the layer is enabled for but had no value.
    pub misses: Vec<ResolvedCacheId>,
    /// Ids the layer is disabled (or unavailable) for.
    pub skipped: Vec<ResolvedCacheId>,
}

impl LayerResult {
    /// A result that passes the whole input through untouched.
    pub fn all_skipped(reqs: Vec<ResolvedCacheId>) -> Self {
        Self {
            skipped: reqs,
            ..Self::default()
        }
    }

    /// Fold another partition into this one. Order across merges is not part
    /// of the contract.
    pub fn merge(&mut self, other: LayerResult) {
        self.hits.extend(other.hits);
        self.misses.extend(other.misses);
        self.skipped.extend(other.skipped);
    }

    pub fn len(&self) -> usize {
        self.hits.len() + self.misses.len() + self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
