//! Multi-layer cache subsystem.
//!
//! ```text
//! LayerController            <- ordered top-down traversal, back-fill writes
//!   └── LayerService          <- per-tier policy + batching (active/disabled)
//!         └── CacheProvider   <- enum dispatch over the storage backends
//!               ├── Memory(MemoryProvider)   in-process TinyLFU (moka)
//!               ├── Redis(RedisProvider)     remote KV (connection manager)
//!               └── Lmdb(LmdbProvider)       local persistent KV (heed)
//! ```
//!
//! Providers only ever see canonical storage keys and opaque value bytes;
//! all policy (enabled flags, TTLs) is applied one level up in the service.

pub mod controller;
pub mod errors;
pub mod provider;
pub mod providers;
pub mod service;

pub use controller::LayerController;
pub use errors::{CacheError, CacheResult};
pub use provider::{CacheProvider, PutEntry};
pub use service::{build_layer_services, LayerService};
