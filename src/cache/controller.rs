//! Cache Controller Module
//!
//! Owns the current [`CacheInstance`] and rebuilds it when the configuration
//! changes. Rebuilds are serialized; the new instance is seeded from the old
//! one and published with a single pointer swap, so readers always see one of
//! the two.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::cache::{BackingStore, CacheInstance, CacheKey, Loader, StatsSnapshot};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::pool::WorkerPool;

// == In-Memory Cache ==
/// The cache callers talk to.
///
/// Until the first successful [`InMemoryCache::configure`] there is no
/// instance: reads return `None` and writes are dropped.
///
/// Rebuilds act as one exclusive section: `configure` holds `rebuild` across
/// both the pool resize and the instance swap, so the pool's lock and
/// `current` are never swapped by two rebuilds at once.
pub struct InMemoryCache<V> {
    app_name: Arc<str>,
    loader: Loader<V>,
    pool: Arc<WorkerPool>,
    current: RwLock<Option<Arc<CacheInstance<V>>>>,
    /// Held for the whole of a rebuild
    rebuild: Mutex<()>,
    generations: AtomicU64,
}

impl<V> InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates an unconfigured cache in front of `store`.
    pub fn new(app_name: impl Into<Arc<str>>, store: Arc<dyn BackingStore<V>>) -> Self {
        let app_name = app_name.into();
        Self {
            pool: Arc::new(WorkerPool::new(app_name.to_string())),
            app_name,
            loader: Loader::new(store),
            current: RwLock::new(None),
            rebuild: Mutex::new(()),
            generations: AtomicU64::new(0),
        }
    }

    /// Creates a cache and applies `config` to it.
    pub fn with_config(
        app_name: impl Into<Arc<str>>,
        store: Arc<dyn BackingStore<V>>,
        config: CacheConfig,
    ) -> Result<Self> {
        let cache = Self::new(app_name, store);
        cache.configure(config)?;
        Ok(cache)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Builds a key scoped to this cache's application.
    pub fn key(&self, key: impl Into<String>) -> CacheKey {
        CacheKey::new(Arc::clone(&self.app_name), key)
    }

    // == Configure ==
    /// Rebuilds the cache instance (and the refresh pool, if its size
    /// changed) from `config`.
    ///
    /// A rejected configuration leaves the current instance in place.
    pub fn configure(&self, config: CacheConfig) -> Result<()> {
        let _rebuild = self.rebuild.lock();

        if let Err(e) = config.validate() {
            error!(app = %self.app_name, error = %e, "Rejected cache configuration; keeping current cache");
            return Err(e);
        }

        if self.pool.size() != Some(config.pool_size) {
            if let Err(e) = self.pool.resize(config.pool_size) {
                error!(app = %self.app_name, error = %e, "Could not resize refresh pool; keeping current cache");
                return Err(e);
            }
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let instance = CacheInstance::new(
            generation,
            config.clone(),
            self.loader.clone(),
            Arc::clone(&self.pool),
        );

        let seeded = match self.current() {
            Some(outgoing) => instance.seed(outgoing.live_entries()),
            None => 0,
        };

        let previous = self.current.write().replace(instance);
        if let Some(previous) = previous {
            previous.invalidate_all();
        }

        info!(
            app = %self.app_name,
            generation,
            seeded,
            capacity = config.capacity,
            expire_after_write_ms = config.expire_after_write.as_millis() as u64,
            expire_after_access_ms = config.expire_after_access.as_millis() as u64,
            refresh_after_write_ms = config.refresh_after_write.as_millis() as u64,
            pool_size = config.pool_size,
            "Cache instance rebuilt"
        );
        Ok(())
    }

    /// The instance reads and writes currently go to.
    pub fn current(&self) -> Option<Arc<CacheInstance<V>>> {
        self.current.read().clone()
    }

    // == Get ==
    /// Returns the value for `key`, fetching it from the backing store on a
    /// miss. `Ok(None)` covers both "no data" and "not configured".
    pub fn get(&self, key: &CacheKey) -> Result<Option<V>> {
        let Some(instance) = self.current() else {
            return Ok(None);
        };
        let value = instance.lookup(key)?;
        debug!(app = %self.app_name, key = %key, found = value.is_some(), "GET");
        Ok(value)
    }

    // == Put ==
    /// Stores `value` under `key`; `None` caches "no data".
    pub fn put(&self, key: CacheKey, value: Option<V>) {
        let Some(instance) = self.current() else {
            return;
        };
        debug!(app = %self.app_name, key = %key, present = value.is_some(), "PUT");
        instance.insert(key, value);
    }

    // == Delete ==
    pub fn delete(&self, key: &CacheKey) {
        let Some(instance) = self.current() else {
            return;
        };
        instance.remove(key);
        debug!(app = %self.app_name, key = %key, "DEL");
    }

    // == Get All ==
    /// Snapshot of every unexpired entry.
    pub fn get_all(&self) -> HashMap<CacheKey, Option<V>> {
        self.current()
            .map(|instance| instance.entries())
            .unwrap_or_default()
    }

    /// Counters of the current instance.
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.current().map(|instance| instance.stats())
    }

    /// Configuration of the current instance.
    pub fn config(&self) -> Option<CacheConfig> {
        self.current().map(|instance| instance.config().clone())
    }

    /// Removes expired entries from the current instance.
    pub fn cleanup_expired(&self) -> usize {
        self.current()
            .map_or(0, |instance| instance.cleanup_expired())
    }

    pub fn len(&self) -> usize {
        self.current().map_or(0, |instance| instance.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl<V> Drop for InMemoryCache<V> {
    fn drop(&mut self) {
        if let Some(instance) = self.current.get_mut().take() {
            instance.retire();
        }
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::{init_tracing, key, wait_until, TestStore, APP};
    use crate::error::CacheError;
    use std::thread;
    use std::time::Duration;

    fn cache(store: &Arc<TestStore>, config: CacheConfig) -> InMemoryCache<String> {
        init_tracing();
        InMemoryCache::<String>::with_config(APP, store.clone(), config).unwrap()
    }

    #[test]
    fn test_unconfigured_cache_is_inert() {
        let store = TestStore::with_values(&[("a", "1")]);
        let cache: InMemoryCache<String> = InMemoryCache::<String>::new(APP, store.clone());

        assert_eq!(cache.get(&key("a")).unwrap(), None);
        cache.put(key("b"), Some("2".to_string()));
        cache.delete(&key("b"));
        assert!(cache.get_all().is_empty());
        assert!(cache.stats().is_none());
        assert!(cache.config().is_none());
        assert_eq!(store.fetches(), 0);
    }

    #[test]
    fn test_get_put_delete() {
        let store = TestStore::with_values(&[("a", "1")]);
        let cache = cache(&store, CacheConfig::default());

        assert_eq!(cache.get(&key("a")).unwrap().as_deref(), Some("1"));
        assert_eq!(cache.get(&key("a")).unwrap().as_deref(), Some("1"));
        assert_eq!(store.fetches(), 1);

        cache.put(key("b"), Some("2".to_string()));
        assert_eq!(cache.get(&key("b")).unwrap().as_deref(), Some("2"));

        cache.delete(&key("b"));
        assert_eq!(cache.get(&key("b")).unwrap(), None);
        assert_eq!(store.fetches(), 2);
    }

    #[test]
    fn test_key_is_scoped_to_app() {
        let store = TestStore::new();
        let cache = cache(&store, CacheConfig::default());
        assert_eq!(cache.key("a"), key("a"));
        assert_eq!(cache.app_name(), APP);
    }

    #[test]
    fn test_fetch_error_propagates() {
        let store = TestStore::with_values(&[("a", "1")]);
        store.set_failing(true);
        let cache = cache(&store, CacheConfig::default());

        assert!(matches!(cache.get(&key("a")), Err(CacheError::Fetch { .. })));
    }

    #[test]
    fn test_reconfigure_preserves_entries_and_resets_stats() {
        let store = TestStore::with_values(&[("a", "1"), ("b", "2")]);
        let cache = cache(&store, CacheConfig::default());
        cache.get(&key("a")).unwrap();
        cache.get(&key("b")).unwrap();
        cache.get(&key("a")).unwrap();
        let before = cache.current().unwrap();

        cache
            .configure(CacheConfig::default().with_expire_after_write(Duration::from_secs(60)))
            .unwrap();

        let after = cache.current().unwrap();
        assert_eq!(after.generation(), before.generation() + 1);
        assert!(before.is_retired());
        assert!(before.is_empty());

        assert_eq!(cache.get_all().len(), 2);
        assert_eq!(cache.get(&key("a")).unwrap().as_deref(), Some("1"));
        assert_eq!(store.fetches(), 2);

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_shrinking_capacity_keeps_recent_entries() {
        let store = TestStore::new();
        let cache = cache(&store, CacheConfig::default().with_capacity(10));
        for i in 0..10 {
            cache.put(key(&i.to_string()), Some(i.to_string()));
        }

        cache.configure(CacheConfig::default().with_capacity(4)).unwrap();

        let entries = cache.get_all();
        assert_eq!(entries.len(), 4);
        for i in 6..10 {
            let name = i.to_string();
            assert_eq!(entries.get(&key(&name)), Some(&Some(name.clone())));
        }
    }

    #[test]
    fn test_invalid_config_keeps_current_instance() {
        let store = TestStore::with_values(&[("a", "1")]);
        let cache = cache(&store, CacheConfig::default());
        cache.get(&key("a")).unwrap();

        let result = cache.configure(CacheConfig::default().with_pool_size(0));
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));

        let current = cache.current().unwrap();
        assert_eq!(current.generation(), 1);
        assert!(!current.is_retired());
        assert_eq!(cache.get(&key("a")).unwrap().as_deref(), Some("1"));
        assert_eq!(store.fetches(), 1);
    }

    #[test]
    fn test_pool_rotates_only_on_size_change() {
        let store = TestStore::new();
        let cache = cache(&store, CacheConfig::default().with_pool_size(2));
        assert_eq!(cache.pool().generation(), Some(1));

        cache.configure(CacheConfig::default().with_pool_size(2).with_capacity(5)).unwrap();
        assert_eq!(cache.pool().generation(), Some(1));

        cache.configure(CacheConfig::default().with_pool_size(4)).unwrap();
        assert_eq!(cache.pool().generation(), Some(2));
        assert_eq!(cache.pool().size(), Some(4));
    }

    #[test]
    fn test_concurrent_reconfigure_serializes() {
        // Reads racing a swap may land on the retired instance and reload,
        // so the store serves the same values.
        let store = TestStore::new();
        for i in 0..20 {
            store.set(&i.to_string(), &i.to_string());
        }
        let cache = Arc::new(cache(&store, CacheConfig::default().with_capacity(50)));
        for i in 0..20 {
            cache.put(key(&i.to_string()), Some(i.to_string()));
        }

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for round in 0..10 {
                        let config = CacheConfig::default()
                            .with_capacity(30 + t * 10 + round)
                            .with_pool_size(1 + (round as usize % 3));
                        cache.configure(config).unwrap();
                        for i in 0..20 {
                            let value = cache.get(&key(&i.to_string())).unwrap();
                            assert_eq!(value, Some(i.to_string()));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.current().unwrap().generation(), 41);
        let entries = cache.get_all();
        assert_eq!(entries.len(), 20);
        for (k, v) in entries {
            assert_eq!(v.as_deref(), Some(k.key()));
        }
    }

    #[test]
    fn test_concurrent_puts_never_mix() {
        let store = TestStore::new();
        let cache = Arc::new(cache(&store, CacheConfig::default()));
        let values = ["left".repeat(64), "right".repeat(64)];

        let handles: Vec<_> = values
            .iter()
            .cloned()
            .map(|value| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..500 {
                        cache.put(key("k"), Some(value.clone()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let value = cache.get(&key("k")).unwrap().unwrap();
        assert!(values.contains(&value));
    }

    #[test]
    fn test_drop_discards_reload_in_flight() {
        let store = TestStore::with_values(&[("a", "v1")]);
        let config = CacheConfig::default()
            .with_expire_after_write(Duration::from_secs(5))
            .with_refresh_after_write(Duration::from_millis(100));
        let cache = cache(&store, config);

        cache.get(&key("a")).unwrap();
        store.set("a", "v2");
        store.set_delay(Duration::from_millis(150));
        thread::sleep(Duration::from_millis(120));

        assert_eq!(cache.get(&key("a")).unwrap().as_deref(), Some("v1"));
        let instance = cache.current().unwrap();
        drop(cache);
        assert!(instance.is_retired());

        // The pool finishes the reload, then lets go of the instance.
        assert!(wait_until(Duration::from_secs(5), || store.fetches() == 2));
        assert!(wait_until(Duration::from_secs(5), || Arc::strong_count(&instance) == 1));

        assert_eq!(instance.stats().reload_successes, 0);
        assert_eq!(instance.entries().get(&key("a")), Some(&Some("v1".to_string())));
    }
}
