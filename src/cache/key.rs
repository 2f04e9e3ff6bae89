//! Cache Key Module

use std::fmt;
use std::sync::Arc;

// == Cache Key ==
/// Identifies a cached value: the owning application plus the logical key.
///
/// Keys are immutable once built; cloning shares the app name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    app_name: Arc<str>,
    key: String,
}

impl CacheKey {
    pub fn new(app_name: impl Into<Arc<str>>, key: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            key: key.into(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.app_name, self.key)
    }
}
