//! Configuration Watcher Task
//!
//! Polls a [`ConfigSource`] and reconfigures the cache whenever the loaded
//! configuration changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::cache::InMemoryCache;
use crate::config::{CacheConfig, ConfigSource};
use crate::error::Result;

/// Spawns a task that polls `source` every `interval`.
///
/// Each distinct configuration is applied once; a rejected one is not
/// retried until the source changes again.
pub fn spawn_config_watcher<V>(
    cache: Arc<InMemoryCache<V>>,
    source: Arc<dyn ConfigSource>,
    interval: Duration,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            app = cache.app_name(),
            interval_ms = interval.as_millis() as u64,
            "Starting configuration watcher"
        );

        let mut last_seen: Option<CacheConfig> = cache.config();
        loop {
            let loaded = match source.load() {
                Ok(config) => config,
                Err(e) => {
                    warn!(app = cache.app_name(), error = %e, "Could not load cache configuration");
                    tokio::time::sleep(interval).await;
                    continue;
                }
            };

            if last_seen.as_ref() != Some(&loaded) {
                debug!(app = cache.app_name(), ?loaded, "Cache configuration changed");
                last_seen = Some(loaded.clone());

                // Rebuilds copy the whole cache; keep them off the async workers.
                let target = Arc::clone(&cache);
                let applied = tokio::task::spawn_blocking(move || target.configure(loaded)).await;
                log_outcome(cache.app_name(), applied);
            }

            tokio::time::sleep(interval).await;
        }
    })
}

/// Logs a reconfiguration that was rejected or never finished; returns
/// whether it took effect.
fn log_outcome(app: &str, applied: std::result::Result<Result<()>, JoinError>) -> bool {
    match applied {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(app, error = %e, "Configuration change was not applied");
            false
        }
        Err(join_err) => {
            error!(app, error = %join_err, "Reconfiguration task did not complete");
            false
        }
    }
}
