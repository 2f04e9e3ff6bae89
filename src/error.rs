//! Error types for the in-memory cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the in-memory cache.
///
/// Only `Fetch` ever reaches callers of `get`; the remaining variants come
/// out of reconfiguration and the refresh worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backing store call behind a synchronous miss failed
    #[error("Fetch failed for key {key}: {reason}")]
    Fetch { key: String, reason: String },

    /// A configuration was rejected before any rebuild happened
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No worker pool generation is accepting reload tasks
    #[error("No refresh worker pool is available")]
    PoolUnavailable,

    /// A worker pool generation could not be started
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

// == Result Type Alias ==
/// Convenience Result type for the in-memory cache.
pub type Result<T> = std::result::Result<T, CacheError>;
