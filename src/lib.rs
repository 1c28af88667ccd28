//! # stratacache
//!
//! A tiered cache coordinator. Clients issue batched `GET`/`PUT`/`DELETE`
//! requests over HTTP; the coordinator resolves every request through an
//! ordered stack of cache layers (in-process -> remote KV -> local
//! persistent KV), falls back to an external HTTP origin on misses, and
//! transparently back-fills the faster layers so future reads hit higher up
//! the hierarchy.
//!
//! Pipeline, top to bottom:
//!
//! ```text
//! HTTP batch API (web)
//!   └── AsyncAdapter (manager::adapter)    bounded async envelope
//!         └── CacheManager (manager)       read/write/evict pipelines
//!               ├── Resolver               cache name -> storage key
//!               ├── LayerController        top-down layer traversal
//!               │     └── LayerService     per-tier policy + batching
//!               │           └── CacheProvider (memory | redis | lmdb)
//!               └── OriginService          bounded origin fall-back
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod origin;
pub mod resolver;
pub mod types;
pub mod web;

pub use error::{Result, ServiceError};
