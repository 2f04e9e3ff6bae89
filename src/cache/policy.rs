//! Expiry Policy Module
//!
//! Decides when an entry is expired and when it is due for a background
//! refresh. The same policy drives the container's per-entry expiration, so
//! entries copied into a new instance keep their remaining lifetime.

use std::time::{Duration, Instant};

use moka::Expiry as EntryExpiry;

use crate::cache::{CacheEntry, CacheKey};
use crate::config::CacheConfig;

// == Expiry ==
/// The single active expiry strategy of a cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Entries never expire by time
    Never,
    /// Entries expire a fixed time after they were written
    AfterWrite(Duration),
    /// Entries expire a fixed time after they were last read or written
    AfterAccess(Duration),
}

// == Expiry Policy ==
/// Expiry and refresh settings derived from a [`CacheConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    expiry: Expiry,
    refresh_after_write: Option<Duration>,
}

impl ExpiryPolicy {
    /// Builds the policy, preferring expire-after-access over
    /// expire-after-write when both are set.
    pub fn from_config(config: &CacheConfig) -> Self {
        let expiry = if !config.expire_after_access.is_zero() {
            Expiry::AfterAccess(config.expire_after_access)
        } else if !config.expire_after_write.is_zero() {
            Expiry::AfterWrite(config.expire_after_write)
        } else {
            Expiry::Never
        };

        let refresh_after_write =
            (!config.refresh_after_write.is_zero()).then_some(config.refresh_after_write);

        Self {
            expiry,
            refresh_after_write,
        }
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    pub fn refresh_after_write(&self) -> Option<Duration> {
        self.refresh_after_write
    }

    // == Is Expired ==
    /// An entry is expired once the configured duration has fully elapsed.
    pub fn is_expired<V>(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        match self.expiry {
            Expiry::Never => false,
            Expiry::AfterWrite(ttl) => now.saturating_duration_since(entry.written_at) >= ttl,
            Expiry::AfterAccess(ttl) => now.saturating_duration_since(entry.accessed_at()) >= ttl,
        }
    }

    /// Time left before `entry` expires, measured from `now`.
    pub fn time_to_expiry<V>(&self, entry: &CacheEntry<V>, now: Instant) -> Option<Duration> {
        match self.expiry {
            Expiry::Never => None,
            Expiry::AfterWrite(ttl) => {
                Some(ttl.saturating_sub(now.saturating_duration_since(entry.written_at)))
            }
            Expiry::AfterAccess(ttl) => {
                Some(ttl.saturating_sub(now.saturating_duration_since(entry.accessed_at())))
            }
        }
    }

    // == Needs Refresh ==
    /// Whether a read at `now` should schedule a background reload.
    ///
    /// Entries with a reload already in flight never need another one.
    pub fn needs_refresh<V>(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        match self.refresh_after_write {
            Some(window) => {
                !entry.is_reloading() && now.saturating_duration_since(entry.written_at) >= window
            }
            None => false,
        }
    }
}

// == Container Expiry ==
// Creation and replacement measure from the entry's own timestamps, so a
// seeded entry is not granted a fresh lifetime. Reads only extend access
// expiry.
impl<V> EntryExpiry<CacheKey, CacheEntry<V>> for ExpiryPolicy {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry<V>,
        created_at: Instant,
    ) -> Option<Duration> {
        self.time_to_expiry(value, created_at)
    }

    fn expire_after_read(
        &self,
        _key: &CacheKey,
        _value: &CacheEntry<V>,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        match self.expiry {
            Expiry::AfterAccess(ttl) => Some(ttl),
            _ => duration_until_expiry,
        }
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CacheEntry<V>,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        self.time_to_expiry(value, updated_at)
    }
}
