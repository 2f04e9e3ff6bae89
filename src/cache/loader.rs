//! Loader Module
//!
//! Bridges the cache to the slower backing store it sits in front of.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use crate::cache::CacheKey;
use crate::error::{CacheError, Result};

// == Fetch Error ==
/// Failure reported by a backing store lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The store has no data for the key
    #[error("No data found")]
    NotFound,

    /// The store call itself failed
    #[error("Backing store call failed: {0}")]
    Failed(String),
}

// == Backing Store ==
/// The remote lookup the cache absorbs repeated reads for.
pub trait BackingStore<V>: Send + Sync {
    fn fetch(&self, key: &CacheKey) -> std::result::Result<V, FetchError>;
}

impl<V, F> BackingStore<V> for F
where
    F: Fn(&CacheKey) -> std::result::Result<V, FetchError> + Send + Sync,
{
    fn fetch(&self, key: &CacheKey) -> std::result::Result<V, FetchError> {
        self(key)
    }
}

// == Loader ==
/// Wraps a backing store, turning "not found" into a cacheable absent value.
pub struct Loader<V> {
    store: Arc<dyn BackingStore<V>>,
}

impl<V> Loader<V> {
    pub fn new(store: Arc<dyn BackingStore<V>>) -> Self {
        Self { store }
    }

    /// Fetches `key` from the backing store.
    ///
    /// Returns `Ok(None)` when the store has nothing for the key.
    pub fn load(&self, key: &CacheKey) -> Result<Option<V>> {
        match self.store.fetch(key) {
            Ok(value) => Ok(Some(value)),
            Err(FetchError::NotFound) => Ok(None),
            Err(FetchError::Failed(reason)) => {
                error!(key = %key, %reason, "Backing store fetch failed while loading key");
                Err(CacheError::Fetch {
                    key: key.to_string(),
                    reason,
                })
            }
        }
    }
}

impl<V> Clone for Loader<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<V> fmt::Debug for Loader<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader").finish_non_exhaustive()
    }
}
