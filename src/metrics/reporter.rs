//! Stats Reporter
//!
//! Turns successive stats snapshots into counter increments and gauges.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{InMemoryCache, StatsSnapshot};
use crate::metrics::{Counter, CounterTable, Gauge, MetricsSink};

const NANOS_PER_MILLI: u64 = 1_000_000;

// == Stats Reporter ==
/// Diffs each snapshot against the previous one and emits the increments.
///
/// The first tick only establishes a baseline. A snapshot from a newer cache
/// instance is diffed against zero, since the rebuilt instance started its
/// counters from scratch.
pub struct StatsReporter {
    app_name: String,
    sink: Arc<dyn MetricsSink>,
    previous: Option<StatsSnapshot>,
}

impl StatsReporter {
    pub fn new(app_name: impl Into<String>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            app_name: app_name.into(),
            sink,
            previous: None,
        }
    }

    /// The snapshot the next tick will be diffed against.
    pub fn previous(&self) -> Option<&StatsSnapshot> {
        self.previous.as_ref()
    }

    // == Tick ==
    /// Reports the current instance of `cache`; does nothing while the cache
    /// is unconfigured.
    pub fn tick<V>(&mut self, cache: &InMemoryCache<V>) -> Option<CounterTable>
    where
        V: Clone + Send + Sync + 'static,
    {
        let snapshot = cache.stats()?;
        self.record(snapshot)
    }

    // == Record ==
    /// Emits gauges for `current` and, once a baseline exists, the counter
    /// increments since the previous snapshot. Returns the increments.
    pub fn record(&mut self, current: StatsSnapshot) -> Option<CounterTable> {
        let deltas = self.previous.as_ref().map(|previous| {
            if previous.generation == current.generation {
                self.deltas(previous, &current)
            } else {
                debug!(
                    app = %self.app_name,
                    from = previous.generation,
                    to = current.generation,
                    "Cache instance rebuilt; diffing against a zero baseline"
                );
                self.deltas(&StatsSnapshot::empty(current.generation), &current)
            }
        });

        if let Some(deltas) = &deltas {
            for (counter, delta) in deltas.iter() {
                let delta = match counter {
                    Counter::TotalLoadTime => delta / NANOS_PER_MILLI,
                    _ => delta,
                };
                self.sink.increment(&self.app_name, counter, delta);
            }
        }

        for gauge in Gauge::ALL {
            self.sink.gauge(&self.app_name, gauge, gauge.read(&current));
        }

        self.previous = Some(current);
        deltas
    }

    fn deltas(&self, previous: &StatsSnapshot, current: &StatsSnapshot) -> CounterTable {
        let before = CounterTable::from_snapshot(previous);
        let after = CounterTable::from_snapshot(current);

        let mut deltas = CounterTable::new();
        for counter in Counter::ALL {
            deltas[counter] = after[counter].checked_sub(before[counter]).unwrap_or_else(|| {
                warn!(
                    app = %self.app_name,
                    metric = counter.name(),
                    before = before[counter],
                    after = after[counter],
                    "Counter went backwards; reporting zero and resynchronizing"
                );
                0
            });
        }
        deltas
    }
}
