//! Cache Instance Module
//!
//! A single bounded, expiring cache built from one [`CacheConfig`]. Entries
//! live in a [`moka::sync::Cache`] with least recently used eviction and
//! per-entry expiry driven by the [`ExpiryPolicy`]. Misses load
//! synchronously through the [`Loader`]; entries past the refresh window are
//! served stale while a reload runs on the [`WorkerPool`].

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use moka::notification::RemovalCause;
use moka::ops::compute::Op;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey, ExpiryPolicy, Loader, StatsCounter, StatsSnapshot};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::pool::WorkerPool;

// == Cache Instance ==
/// One generation of the cache.
///
/// Instances are created by the controller, seeded from their predecessor
/// and retired with [`CacheInstance::invalidate_all`] once superseded.
pub struct CacheInstance<V> {
    generation: u64,
    config: CacheConfig,
    policy: ExpiryPolicy,
    loader: Loader<V>,
    pool: Arc<WorkerPool>,
    entries: Cache<CacheKey, CacheEntry<V>>,
    stats: Arc<StatsCounter>,
    versions: AtomicU64,
    retired: AtomicBool,
    this: Weak<Self>,
}

impl<V> CacheInstance<V> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn policy(&self) -> &ExpiryPolicy {
        &self.policy
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Stops the instance from accepting loaded or reloaded values.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    fn next_version(&self) -> u64 {
        self.versions.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl<V> CacheInstance<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    pub fn new(
        generation: u64,
        config: CacheConfig,
        loader: Loader<V>,
        pool: Arc<WorkerPool>,
    ) -> Arc<Self> {
        let policy = ExpiryPolicy::from_config(&config);
        let stats = Arc::new(StatsCounter::new());

        let listener_stats = Arc::clone(&stats);
        let mut builder = Cache::builder()
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(policy)
            .eviction_listener(move |key: Arc<CacheKey>, _entry: CacheEntry<V>, cause: RemovalCause| {
                if cause.was_evicted() {
                    listener_stats.record_eviction();
                    debug!(key = %key, ?cause, generation, "Evicted cache entry");
                }
            });
        if config.capacity > 0 {
            builder = builder.max_capacity(config.capacity);
        }
        let entries = builder.build();

        Arc::new_cyclic(|this| Self {
            generation,
            config,
            policy,
            loader,
            pool,
            entries,
            stats,
            versions: AtomicU64::new(0),
            retired: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    // == Lookup ==
    /// Returns the cached value for `key`, loading it on a miss.
    ///
    /// `Ok(None)` means the backing store has no data for the key. Load
    /// failures are returned and leave no entry behind.
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<V>> {
        let now = Instant::now();
        let Some(entry) = self.entries.get(key) else {
            self.stats.record_miss();
            return self.load(key);
        };

        entry.touch(now);
        self.stats.record_hit();
        if self.policy.needs_refresh(&entry, now) && entry.begin_reload() {
            self.schedule_reload(key, &entry);
        }
        Ok(entry.value)
    }

    fn load(&self, key: &CacheKey) -> Result<Option<V>> {
        let started = Instant::now();
        let loaded = self.loader.load(key);
        let elapsed = started.elapsed();

        match loaded {
            Ok(value) => {
                self.stats.record_load_success(elapsed);
                if !self.is_retired() {
                    self.store(key.clone(), value.clone());
                }
                Ok(value)
            }
            Err(e) => {
                self.stats.record_load_exception(elapsed);
                Err(e)
            }
        }
    }

    // == Insert ==
    /// Stores `value` (or the absent sentinel) under `key`, resetting its
    /// write time.
    pub fn insert(&self, key: CacheKey, value: Option<V>) {
        self.store(key, value);
    }

    // == Remove ==
    /// Removes the entry for `key`; returns whether one was resident.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Entries ==
    /// Snapshot of all unexpired entries.
    pub fn entries(&self) -> HashMap<CacheKey, Option<V>> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| !self.policy.is_expired(entry, now))
            .map(|(key, entry)| (CacheKey::clone(&key), entry.value))
            .collect()
    }

    /// Unexpired entries with their bookkeeping, least recently used first.
    pub fn live_entries(&self) -> Vec<(CacheKey, CacheEntry<V>)> {
        let now = Instant::now();
        let mut live: Vec<(CacheKey, CacheEntry<V>)> = self
            .entries
            .iter()
            .filter(|(_, entry)| !self.policy.is_expired(entry, now))
            .map(|(key, entry)| (CacheKey::clone(&key), entry))
            .collect();
        live.sort_by_key(|(_, entry)| (entry.accessed_at(), entry.version));
        live
    }

    // == Seed ==
    /// Copies entries from a predecessor, keeping their write and access
    /// times.
    ///
    /// Entries arrive least recently used first. When capacity is short the
    /// oldest are skipped, and the rest are inserted in arrival order so the
    /// container's recency order matches the predecessor's.
    pub fn seed(&self, entries: Vec<(CacheKey, CacheEntry<V>)>) -> usize {
        let now = Instant::now();
        let mut live: Vec<_> = entries
            .into_iter()
            .filter(|(_, entry)| !self.policy.is_expired(entry, now))
            .collect();

        let capacity = self.config.capacity as usize;
        if capacity > 0 && live.len() > capacity {
            live.drain(..live.len() - capacity);
        }

        let seeded = live.len();
        for (key, entry) in live {
            let entry = entry.detach(self.next_version());
            self.entries.insert(key, entry);
        }
        self.entries.run_pending_tasks();
        seeded
    }

    // == Invalidate All ==
    /// Retires the instance and drops every entry. Reloads still running
    /// against it are discarded when they complete.
    pub fn invalidate_all(&self) {
        self.retire();
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.stats.evictions();
        self.entries.run_pending_tasks();
        self.stats.evictions().saturating_sub(before) as usize
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.entries.run_pending_tasks();
        self.stats.snapshot(self.generation, self.entries.entry_count() as usize)
    }

    /// Resident entries, including expired ones not yet cleaned up.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, key: CacheKey, value: Option<V>) {
        let entry = CacheEntry::new(value, self.next_version(), Instant::now());
        self.entries.insert(key.clone(), entry);
        // A write racing with retirement must not outlive it.
        if self.is_retired() {
            self.entries.invalidate(&key);
        }
    }

    // == Refresh Ahead ==
    fn schedule_reload(&self, key: &CacheKey, scheduled: &CacheEntry<V>) {
        let Some(this) = self.this.upgrade() else {
            scheduled.finish_reload();
            return;
        };

        let task_key = key.clone();
        let task_entry = scheduled.clone();
        let submitted = self.pool.submit(move || this.reload(task_key, task_entry));
        if let Err(e) = submitted {
            warn!(key = %key, error = %e, "Could not schedule background reload");
            scheduled.finish_reload();
        }
    }

    /// Runs on a pool worker. Never panics back into the pool.
    fn reload(&self, key: CacheKey, scheduled: CacheEntry<V>) {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.loader.load(&key)))
            .unwrap_or_else(|_| {
                Err(CacheError::Fetch {
                    key: key.to_string(),
                    reason: "backing store panicked".to_string(),
                })
            });
        self.complete_reload(&key, &scheduled, outcome, started.elapsed());
        scheduled.finish_reload();
    }

    fn complete_reload(
        &self,
        key: &CacheKey,
        scheduled: &CacheEntry<V>,
        outcome: Result<Option<V>>,
        elapsed: Duration,
    ) {
        if self.is_retired() {
            debug!(key = %key, generation = self.generation, "Discarding reload for retired cache instance");
            return;
        }

        match outcome {
            Ok(Some(value)) => {
                self.stats.record_load_success(elapsed);
                self.stats.record_reload_success();
                let fresh = CacheEntry::new(Some(value), self.next_version(), Instant::now());

                let mut replaced = false;
                self.entries.entry_by_ref(key).and_compute_with(|current| match current {
                    Some(current)
                        if current.value().version == scheduled.version && !self.is_retired() =>
                    {
                        replaced = true;
                        Op::Put(fresh)
                    }
                    _ => Op::Nop,
                });

                if !replaced {
                    debug!(key = %key, "Discarding reload for entry written since it was scheduled");
                } else if self.is_retired() {
                    self.entries.invalidate(key);
                } else {
                    debug!(key = %key, "Reloaded entry in background");
                }
            }
            Ok(None) => {
                self.stats.record_load_success(elapsed);
                self.stats.record_reload_not_found();
                debug!(key = %key, "Reload found no data; keeping previous value");
            }
            Err(e) => {
                self.stats.record_load_exception(elapsed);
                self.stats.record_reload_failure();
                warn!(key = %key, error = %e, "Background reload failed; keeping previous value");
            }
        }
    }
}
