//! Stats Reporting Task

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::cache::InMemoryCache;
use crate::metrics::StatsReporter;

/// Spawns a task that runs `reporter` against `cache` every `interval`.
///
/// Abort the returned handle to stop reporting.
pub fn spawn_reporter_task<V>(
    cache: Arc<InMemoryCache<V>>,
    mut reporter: StatsReporter,
    interval: Duration,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            app = cache.app_name(),
            interval_ms = interval.as_millis() as u64,
            "Starting stats reporter task"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            reporter.tick(&cache);
        }
    })
}
