//! Cache Module
//!
//! Provides the bounded, expiring cache instance with refresh-ahead reloads
//! and the controller that hot-swaps instances on reconfiguration.

mod controller;
mod entry;
mod instance;
mod key;
mod loader;
mod policy;
mod stats;

#[cfg(test)]
pub(crate) mod testing;

// Re-export public types
pub use controller::InMemoryCache;
pub use entry::CacheEntry;
pub use instance::CacheInstance;
pub use key::CacheKey;
pub use loader::{BackingStore, FetchError, Loader};
pub use policy::{Expiry, ExpiryPolicy};
pub use stats::{StatsCounter, StatsSnapshot};
