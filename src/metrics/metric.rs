//! Metric Set
//!
//! The closed set of counters and gauges the reporter emits, with a small
//! table indexed by counter.

use std::ops::{Index, IndexMut};

use serde::Serialize;

use crate::cache::StatsSnapshot;

/// Metric name every counter and gauge is registered under; the individual
/// metric travels as the `metric` tag.
pub const METRIC_NAME: &str = "inmemory_cache";

// == Counter ==
/// Monotonic counters, reported as per-tick increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Counter {
    Hits,
    Misses,
    Evictions,
    Requests,
    LoadExceptions,
    Loads,
    LoadSuccesses,
    TotalLoadTime,
    ReloadSuccesses,
    ReloadNotFound,
    ReloadFailures,
}

impl Counter {
    pub const COUNT: usize = 11;

    pub const ALL: [Counter; Counter::COUNT] = [
        Counter::Hits,
        Counter::Misses,
        Counter::Evictions,
        Counter::Requests,
        Counter::LoadExceptions,
        Counter::Loads,
        Counter::LoadSuccesses,
        Counter::TotalLoadTime,
        Counter::ReloadSuccesses,
        Counter::ReloadNotFound,
        Counter::ReloadFailures,
    ];

    /// Value of the `metric` tag.
    pub fn name(self) -> &'static str {
        match self {
            Counter::Hits => "hits",
            Counter::Misses => "miss",
            Counter::Evictions => "evictions",
            Counter::Requests => "requests",
            Counter::LoadExceptions => "loadExceptionCount",
            Counter::Loads => "loadCount",
            Counter::LoadSuccesses => "loadSuccessCount",
            Counter::TotalLoadTime => "totalLoadTime-ms",
            Counter::ReloadSuccesses => "reloadSuccess",
            Counter::ReloadNotFound => "reloadNotFound",
            Counter::ReloadFailures => "reloadFail",
        }
    }

    /// Raw cumulative value in `snapshot`. Load time is in nanoseconds.
    pub fn read(self, snapshot: &StatsSnapshot) -> u64 {
        match self {
            Counter::Hits => snapshot.hits,
            Counter::Misses => snapshot.misses,
            Counter::Evictions => snapshot.evictions,
            Counter::Requests => snapshot.request_count(),
            Counter::LoadExceptions => snapshot.load_exceptions,
            Counter::Loads => snapshot.load_count(),
            Counter::LoadSuccesses => snapshot.load_successes,
            Counter::TotalLoadTime => snapshot.total_load_time_nanos,
            Counter::ReloadSuccesses => snapshot.reload_successes,
            Counter::ReloadNotFound => snapshot.reload_not_found,
            Counter::ReloadFailures => snapshot.reload_failures,
        }
    }
}

// == Gauge ==
/// Point-in-time values, reported as-is on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Gauge {
    HitRate,
    LoadExceptionRate,
    AverageLoadTime,
    Size,
}

impl Gauge {
    pub const COUNT: usize = 4;

    pub const ALL: [Gauge; Gauge::COUNT] = [
        Gauge::HitRate,
        Gauge::LoadExceptionRate,
        Gauge::AverageLoadTime,
        Gauge::Size,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Gauge::HitRate => "hitrate",
            Gauge::LoadExceptionRate => "loadExceptionRate",
            Gauge::AverageLoadTime => "averageLoadTime-ms",
            Gauge::Size => "size",
        }
    }

    pub fn read(self, snapshot: &StatsSnapshot) -> f64 {
        match self {
            Gauge::HitRate => snapshot.hit_rate(),
            Gauge::LoadExceptionRate => snapshot.load_exception_rate(),
            Gauge::AverageLoadTime => snapshot.average_load_penalty().as_nanos() as f64 / 1_000_000.0,
            Gauge::Size => snapshot.size as f64,
        }
    }
}

// == Counter Table ==
/// One `u64` per [`Counter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterTable([u64; Counter::COUNT]);

impl CounterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every counter out of `snapshot`.
    pub fn from_snapshot(snapshot: &StatsSnapshot) -> Self {
        let mut table = Self::new();
        for counter in Counter::ALL {
            table[counter] = counter.read(snapshot);
        }
        table
    }

    pub fn iter(&self) -> impl Iterator<Item = (Counter, u64)> + '_ {
        Counter::ALL.into_iter().map(move |counter| (counter, self[counter]))
    }
}

impl Index<Counter> for CounterTable {
    type Output = u64;

    fn index(&self, counter: Counter) -> &u64 {
        &self.0[counter as usize]
    }
}

impl IndexMut<Counter> for CounterTable {
    fn index_mut(&mut self, counter: Counter) -> &mut u64 {
        &mut self.0[counter as usize]
    }
}
