//! Configuration Module
//!
//! Holds the five tunables of the in-memory cache and the ways they reach the
//! cache at runtime: environment variables and pluggable configuration sources.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: u64 = 100;

/// Default number of refresh worker threads.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Upper bound accepted for the refresh worker pool.
pub const MAX_POOL_SIZE: usize = 1024;

// == Cache Config ==
/// A snapshot of the cache tunables.
///
/// A zero duration disables the corresponding policy and a zero capacity
/// leaves the cache unbounded. When both expiry durations are set,
/// expire-after-access wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries, 0 = unbounded
    pub capacity: u64,
    /// Entries expire this long after they were written
    #[serde(rename = "expire_after_write_ms", with = "millis")]
    pub expire_after_write: Duration,
    /// Entries expire this long after they were last read or written
    #[serde(rename = "expire_after_access_ms", with = "millis")]
    pub expire_after_access: Duration,
    /// Entries older than this are reloaded in the background on read
    #[serde(rename = "refresh_after_write_ms", with = "millis")]
    pub refresh_after_write: Duration,
    /// Number of threads serving background reloads
    pub pool_size: usize,
}

impl CacheConfig {
    /// Creates a config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// `<APP>` is the app name upper-cased with non-alphanumerics mapped to `_`.
    /// - `<APP>_INMEMORY_CACHE_SIZE` - Maximum entries (default: 100)
    /// - `<APP>_INMEMORY_EXPIRE_AFTER_WRITE_DURATION_MS` - falls back to
    ///   `<APP>_INMEMORY_CACHE_DURATION_MS` (default: 0)
    /// - `<APP>_INMEMORY_EXPIRE_AFTER_ACCESS_DURATION_MS` (default: 0)
    /// - `<APP>_INMEMORY_REFRESH_AFTER_WRITE_DURATION_MS` (default: 0)
    /// - `<APP>_THREAD_POOL_SIZE` - Refresh worker threads (default: 5)
    pub fn from_env(app_name: &str) -> Self {
        let prefix = env_prefix(app_name);
        let var = |suffix: &str| env::var(format!("{prefix}_{suffix}")).ok();
        let millis = |suffix: &str| {
            var(suffix)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        Self {
            capacity: var("INMEMORY_CACHE_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_CAPACITY),
            expire_after_write: millis("INMEMORY_EXPIRE_AFTER_WRITE_DURATION_MS")
                .or_else(|| millis("INMEMORY_CACHE_DURATION_MS"))
                .unwrap_or(Duration::ZERO),
            expire_after_access: millis("INMEMORY_EXPIRE_AFTER_ACCESS_DURATION_MS")
                .unwrap_or(Duration::ZERO),
            refresh_after_write: millis("INMEMORY_REFRESH_AFTER_WRITE_DURATION_MS")
                .unwrap_or(Duration::ZERO),
            pool_size: var("THREAD_POOL_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_POOL_SIZE),
        }
    }

    // == Validate ==
    /// Checks the config before it is allowed to replace a working cache.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(CacheError::InvalidConfig(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if self.pool_size > MAX_POOL_SIZE {
            return Err(CacheError::InvalidConfig(format!(
                "pool_size {} exceeds maximum of {}",
                self.pool_size, MAX_POOL_SIZE
            )));
        }
        Ok(())
    }

    /// Builder-style setter for the capacity.
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builder-style setter for expire-after-write.
    pub fn with_expire_after_write(mut self, duration: Duration) -> Self {
        self.expire_after_write = duration;
        self
    }

    /// Builder-style setter for expire-after-access.
    pub fn with_expire_after_access(mut self, duration: Duration) -> Self {
        self.expire_after_access = duration;
        self
    }

    /// Builder-style setter for refresh-after-write.
    pub fn with_refresh_after_write(mut self, duration: Duration) -> Self {
        self.refresh_after_write = duration;
        self
    }

    /// Builder-style setter for the worker pool size.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            expire_after_write: Duration::ZERO,
            expire_after_access: Duration::ZERO,
            refresh_after_write: Duration::ZERO,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

fn env_prefix(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

// == Config Sources ==
/// Supplies the current configuration for an application.
///
/// The config watcher task polls a source and reconfigures the cache when
/// the returned value changes.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<CacheConfig>;
}

/// Reads the configuration from environment variables on every poll.
#[derive(Debug, Clone)]
pub struct EnvConfigSource {
    app_name: String,
}

impl EnvConfigSource {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl ConfigSource for EnvConfigSource {
    fn load(&self) -> Result<CacheConfig> {
        Ok(CacheConfig::from_env(&self.app_name))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
