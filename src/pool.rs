//! Refresh Worker Pool
//!
//! Owns the fixed-size thread pool that runs background reloads. Each resize
//! starts a new pool generation and retires the previous one: a retired
//! generation accepts no new work, finishes what it already has, and is then
//! shut down on a separate thread so `resize` never waits for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::MAX_POOL_SIZE;
use crate::error::{CacheError, Result};

// == Pool Generation ==
/// One instantiation of the worker pool.
///
/// Tasks run on the runtime's blocking threads, capped at `size`, so a slow
/// backing store call occupies exactly one worker.
#[derive(Debug)]
pub struct PoolGeneration {
    id: u64,
    size: usize,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    tracker: TaskTracker,
}

impl PoolGeneration {
    fn start(name: &str, id: u64, size: usize) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .max_blocking_threads(size)
            .thread_name(format!("{name}-inmemory-refresh-{id}"))
            .build()
            .map_err(|e| {
                CacheError::WorkerPool(format!("failed to start pool generation {id}: {e}"))
            })?;

        Ok(Self {
            id,
            size,
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            tracker: TaskTracker::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks queued or running on this generation.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Detached; the tracker counts it until it finishes.
        let _ = self.tracker.spawn_blocking_on(task, &self.handle);
    }

    // == Retire ==
    /// Stops the generation once its outstanding tasks have finished.
    ///
    /// Callers must have unpublished the generation first so no new task can
    /// be spawned onto it.
    fn retire(&self) {
        self.tracker.close();
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };

        let id = self.id;
        let tracker = self.tracker.clone();
        let drain = Drain(Some(runtime));
        let spawned = thread::Builder::new()
            .name(format!("inmemory-refresh-retire-{id}"))
            .spawn(move || {
                let pending = tracker.len();
                if let Some(runtime) = drain.0.as_ref() {
                    runtime.block_on(tracker.wait());
                }
                drop(drain);
                info!(
                    generation = id,
                    drained = pending,
                    "Retired refresh worker pool generation"
                );
            });

        if let Err(e) = spawned {
            warn!(generation = id, error = %e, "Could not spawn drain thread; pool stopped without draining");
        }
    }
}

impl Drop for PoolGeneration {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

/// Shuts a runtime down without blocking, wherever it is dropped.
struct Drain(Option<Runtime>);

impl Drop for Drain {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

// == Worker Pool ==
/// Manages the current pool generation.
///
/// `submit` holds the read lock while it spawns, and `resize` swaps
/// generations under the write lock, so a task is either spawned on a
/// generation before it is retired or sees the new one.
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    current: RwLock<Option<Arc<PoolGeneration>>>,
    generations: AtomicU64,
}

impl WorkerPool {
    /// Creates a manager with no generation; call [`WorkerPool::resize`] to start one.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: RwLock::new(None),
            generations: AtomicU64::new(0),
        }
    }

    // == Resize ==
    /// Starts a generation of `size` workers and retires the previous one.
    pub fn resize(&self, size: usize) -> Result<()> {
        if size == 0 || size > MAX_POOL_SIZE {
            return Err(CacheError::InvalidConfig(format!(
                "pool size {size} must be between 1 and {MAX_POOL_SIZE}"
            )));
        }

        let id = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let generation = Arc::new(PoolGeneration::start(&self.name, id, size)?);

        let previous = self.current.write().replace(generation);
        info!(pool = %self.name, generation = id, size, "Refresh worker pool started");

        if let Some(previous) = previous {
            debug!(
                pool = %self.name,
                generation = previous.id(),
                in_flight = previous.in_flight(),
                "Retiring refresh worker pool generation"
            );
            previous.retire();
        }
        Ok(())
    }

    // == Submit ==
    /// Queues `task` on the current generation without blocking.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let current = self.current.read();
        match current.as_ref() {
            Some(generation) => {
                generation.spawn(task);
                Ok(())
            }
            None => Err(CacheError::PoolUnavailable),
        }
    }

    /// Worker count of the current generation.
    pub fn size(&self) -> Option<usize> {
        self.current.read().as_ref().map(|g| g.size())
    }

    /// Id of the current generation; ids start at 1 and only grow.
    pub fn generation(&self) -> Option<u64> {
        self.current.read().as_ref().map(|g| g.id())
    }

    /// Tasks queued or running on the current generation.
    pub fn in_flight(&self) -> usize {
        self.current
            .read()
            .as_ref()
            .map_or(0, |g| g.in_flight())
    }

    // == Shutdown ==
    /// Retires the current generation, leaving the pool without one.
    pub fn shutdown(&self) {
        let previous = self.current.write().take();
        if let Some(previous) = previous {
            previous.retire();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
