//! Background Tasks Module
//!
//! Periodic tokio tasks that run alongside an [`InMemoryCache`](crate::InMemoryCache).
//!
//! # Tasks
//! - Stats reporting: emits counter increments and gauges every tick
//! - TTL Cleanup: removes expired entries at a configured interval
//! - Config watching: polls a configuration source and reconfigures on change

mod cleanup;
mod config_watch;
mod report;

pub use cleanup::spawn_cleanup_task;
pub use config_watch::spawn_config_watcher;
pub use report::spawn_reporter_task;
