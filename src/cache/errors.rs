//! Cache error types.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to connect to a cache backend.
    #[error("cache connection error: {0}")]
    Connection(String),

    /// Failed to serialize or deserialize a cache value.
    #[error("cache serialization error: {0}")]
    Serialization(String),

    /// A cache operation exceeded its deadline.
    #[error("cache operation timed out: {0}")]
    Timeout(String),

    /// Generic backend error.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
