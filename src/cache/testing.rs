//! Shared helpers for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use crate::cache::{BackingStore, CacheKey, FetchError};

pub(crate) const APP: &str = "movies";

pub(crate) fn key(name: &str) -> CacheKey {
    CacheKey::new(APP, name)
}

/// Sends log output to the test harness; set `RUST_LOG` to see it.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A backing store that counts fetches and can be slowed down or broken.
#[derive(Default)]
pub(crate) struct TestStore {
    values: Mutex<HashMap<String, String>>,
    fetches: AtomicUsize,
    delay: Mutex<Duration>,
    failing: AtomicBool,
    panicking: AtomicBool,
}

impl TestStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_values(values: &[(&str, &str)]) -> Arc<Self> {
        let store = Self::new();
        for (k, v) in values {
            store.set(k, v);
        }
        store
    }

    pub(crate) fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    pub(crate) fn remove(&self, key: &str) {
        self.values.lock().remove(key);
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn set_panicking(&self, panicking: bool) {
        self.panicking.store(panicking, Ordering::SeqCst);
    }
}

impl BackingStore<String> for TestStore {
    fn fetch(&self, key: &CacheKey) -> Result<String, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if self.panicking.load(Ordering::SeqCst) {
            panic!("backing store exploded");
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Failed("store unavailable".to_string()));
        }
        self.values
            .lock()
            .get(key.key())
            .cloned()
            .ok_or(FetchError::NotFound)
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
