//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use crate::cache::InMemoryCache;

/// Spawns a task that purges expired entries from the current cache
/// instance every `interval`.
///
/// Reads already skip expired entries; this only bounds how long they stay
/// resident. Abort the returned handle to stop the task.
pub fn spawn_cleanup_task<V>(cache: Arc<InMemoryCache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            app = cache.app_name(),
            interval_ms = interval.as_millis() as u64,
            "Starting TTL cleanup task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let target = Arc::clone(&cache);
            let joined = tokio::task::spawn_blocking(move || target.cleanup_expired()).await;
            let removed = removed_count(cache.app_name(), joined);

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}

/// Entries removed by one cleanup pass; a pass that panicked removed none.
fn removed_count(app: &str, joined: Result<usize, JoinError>) -> usize {
    match joined {
        Ok(removed) => removed,
        Err(join_err) => {
            error!(app, error = %join_err, "TTL cleanup pass did not complete");
            0
        }
    }
}
