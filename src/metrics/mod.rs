//! Metrics Module
//!
//! Reports the cache's statistics as counters and gauges.

mod metric;
mod reporter;
mod sink;

pub use metric::{Counter, CounterTable, Gauge, METRIC_NAME};
pub use reporter::StatsReporter;
pub use sink::{MetricsSink, RecordingSink, TracingSink};
