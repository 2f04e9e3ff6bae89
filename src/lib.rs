//! In-Memory Cache - A reconfigurable near cache in front of a slow backing store
//!
//! Provides a bounded, expiring cache with refresh-ahead reloads that can be
//! rebuilt with new settings at runtime without losing its contents.

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod tasks;

pub use cache::{BackingStore, CacheKey, FetchError, InMemoryCache, StatsSnapshot};
pub use config::{CacheConfig, ConfigSource, EnvConfigSource};
pub use error::{CacheError, Result};
pub use metrics::{MetricsSink, StatsReporter, TracingSink};
pub use pool::WorkerPool;
pub use tasks::{spawn_cleanup_task, spawn_config_watcher, spawn_reporter_task};
