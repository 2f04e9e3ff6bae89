//! Cache Statistics Module
//!
//! Tracks hits, misses, evictions and load activity of one cache instance,
//! and freezes them into immutable snapshots for reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Stats Counter ==
/// Cumulative counters owned by a single cache instance.
///
/// Counters only ever grow; a rebuilt instance starts a new counter at zero.
/// They are shared with the container's eviction listener, so every
/// operation takes `&self`.
#[derive(Debug, Default)]
pub struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    load_successes: AtomicU64,
    load_exceptions: AtomicU64,
    total_load_nanos: AtomicU64,
    reload_successes: AtomicU64,
    reload_not_found: AtomicU64,
    reload_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        bump(&self.hits);
    }

    pub fn record_miss(&self) {
        bump(&self.misses);
    }

    pub fn record_eviction(&self) {
        bump(&self.evictions);
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    // == Record Load ==
    /// Records a finished backing store call, foreground or background.
    pub fn record_load_success(&self, elapsed: Duration) {
        bump(&self.load_successes);
        self.add_load_time(elapsed);
    }

    pub fn record_load_exception(&self, elapsed: Duration) {
        bump(&self.load_exceptions);
        self.add_load_time(elapsed);
    }

    fn add_load_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_load_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    // == Record Reload Outcome ==
    pub fn record_reload_success(&self) {
        bump(&self.reload_successes);
    }

    pub fn record_reload_not_found(&self) {
        bump(&self.reload_not_found);
    }

    pub fn record_reload_failure(&self) {
        bump(&self.reload_failures);
    }

    // == Snapshot ==
    /// Freezes the counters for the instance `generation` holding `size` entries.
    pub fn snapshot(&self, generation: u64, size: usize) -> StatsSnapshot {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            generation,
            hits: read(&self.hits),
            misses: read(&self.misses),
            evictions: read(&self.evictions),
            load_successes: read(&self.load_successes),
            load_exceptions: read(&self.load_exceptions),
            total_load_time_nanos: read(&self.total_load_nanos),
            reload_successes: read(&self.reload_successes),
            reload_not_found: read(&self.reload_not_found),
            reload_failures: read(&self.reload_failures),
            size: size as u64,
            taken_at: Utc::now(),
        }
    }
}

// == Stats Snapshot ==
/// Immutable view of an instance's counters at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Cache instance the counters belong to
    pub generation: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub load_successes: u64,
    pub load_exceptions: u64,
    pub total_load_time_nanos: u64,
    pub reload_successes: u64,
    pub reload_not_found: u64,
    pub reload_failures: u64,
    /// Resident entries when the snapshot was taken
    pub size: u64,
    pub taken_at: DateTime<Utc>,
}

impl StatsSnapshot {
    /// An all-zero baseline for `generation`.
    pub fn empty(generation: u64) -> Self {
        StatsCounter::new().snapshot(generation, 0)
    }

    pub fn request_count(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn load_count(&self) -> u64 {
        self.load_successes + self.load_exceptions
    }

    // == Hit Rate ==
    /// hits / requests, or 1.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        match self.request_count() {
            0 => 1.0,
            requests => self.hits as f64 / requests as f64,
        }
    }

    /// load exceptions / loads, or 0.0 if nothing was loaded.
    pub fn load_exception_rate(&self) -> f64 {
        match self.load_count() {
            0 => 0.0,
            loads => self.load_exceptions as f64 / loads as f64,
        }
    }

    pub fn total_load_time(&self) -> Duration {
        Duration::from_nanos(self.total_load_time_nanos)
    }

    /// Mean time spent per backing store call.
    pub fn average_load_penalty(&self) -> Duration {
        match self.load_count() {
            0 => Duration::ZERO,
            loads => Duration::from_nanos(self.total_load_time_nanos / loads),
        }
    }
}
