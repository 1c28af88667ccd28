//! Concrete cache provider implementations.

pub mod lmdb;
pub mod memory;
pub mod redis;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use lmdb::LmdbProvider;
pub use memory::MemoryProvider;
pub use redis::RedisProvider;

#[cfg(any(test, feature = "test-utils"))]
pub use testing::RecordingProvider;
