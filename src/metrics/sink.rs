//! Metrics Sinks
//!
//! Where reported counters and gauges go.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::metrics::{Counter, CounterTable, Gauge, METRIC_NAME};

// == Metrics Sink ==
/// Accepts counters and gauges tagged with the reporting application.
pub trait MetricsSink: Send + Sync {
    /// Adds `delta` to `counter`.
    fn increment(&self, app_name: &str, counter: Counter, delta: u64);

    /// Sets `gauge` to `value`.
    fn gauge(&self, app_name: &str, gauge: Gauge, value: f64);
}

// == Tracing Sink ==
/// Emits every metric as a `debug` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn increment(&self, app_name: &str, counter: Counter, delta: u64) {
        debug!(
            metric_name = METRIC_NAME,
            app = app_name,
            metric = counter.name(),
            delta,
            "counter"
        );
    }

    fn gauge(&self, app_name: &str, gauge: Gauge, value: f64) {
        debug!(
            metric_name = METRIC_NAME,
            app = app_name,
            metric = gauge.name(),
            value,
            "gauge"
        );
    }
}

// == Recording Sink ==
/// Keeps running totals in memory, per application.
#[derive(Debug, Default)]
pub struct RecordingSink {
    counters: Mutex<HashMap<String, CounterTable>>,
    gauges: Mutex<HashMap<String, [Option<f64>; Gauge::COUNT]>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all increments reported for `counter`.
    pub fn counter(&self, app_name: &str, counter: Counter) -> u64 {
        self.counters
            .lock()
            .get(app_name)
            .map_or(0, |table| table[counter])
    }

    /// Last value reported for `gauge`.
    pub fn gauge_value(&self, app_name: &str, gauge: Gauge) -> Option<f64> {
        self.gauges
            .lock()
            .get(app_name)
            .and_then(|values| values[gauge as usize])
    }
}

impl MetricsSink for RecordingSink {
    fn increment(&self, app_name: &str, counter: Counter, delta: u64) {
        let mut counters = self.counters.lock();
        let table = counters.entry(app_name.to_string()).or_default();
        table[counter] += delta;
    }

    fn gauge(&self, app_name: &str, gauge: Gauge, value: f64) {
        let mut gauges = self.gauges.lock();
        gauges.entry(app_name.to_string()).or_default()[gauge as usize] = Some(value);
    }
}
