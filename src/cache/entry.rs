//! Cache Entry Module
//!
//! Defines the value stored per key, with the write/access bookkeeping used
//! by expiry and refresh-ahead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

// == Cache Entry ==
/// A single resident entry.
///
/// `value` is `None` when the backing store reported no data, so negative
/// lookups are cached instead of being retried on every read.
///
/// The container hands out clones of the entry. The access time and the
/// reload flag are shared between clones, so a reader can mark the entry
/// it was given and every later reader sees it.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value, or the "no value" sentinel
    pub value: Option<V>,
    /// When the value was last written (insert, load or reload)
    pub written_at: Instant,
    /// Write stamp; changes on every write so stale reloads can be detected
    pub version: u64,
    accessed_at: Arc<Mutex<Instant>>,
    reloading: Arc<AtomicBool>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a freshly written entry.
    pub fn new(value: Option<V>, version: u64, now: Instant) -> Self {
        Self {
            value,
            written_at: now,
            version,
            accessed_at: Arc::new(Mutex::new(now)),
            reloading: Arc::new(AtomicBool::new(false)),
        }
    }

    /// When the entry was last read or written.
    pub fn accessed_at(&self) -> Instant {
        *self.accessed_at.lock()
    }

    // == Touch ==
    /// Records a read at `now`.
    pub fn touch(&self, now: Instant) {
        let mut accessed_at = self.accessed_at.lock();
        if now > *accessed_at {
            *accessed_at = now;
        }
    }

    // == Reload Flag ==
    /// Whether a background reload is currently in flight.
    pub fn is_reloading(&self) -> bool {
        self.reloading.load(Ordering::Acquire)
    }

    /// Claims the entry for a background reload. Only one caller wins until
    /// [`CacheEntry::finish_reload`] is called.
    pub fn begin_reload(&self) -> bool {
        self.reloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn finish_reload(&self) {
        self.reloading.store(false, Ordering::Release);
    }

    /// Whether the entry holds an actual value rather than the sentinel.
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

impl<V: Clone> CacheEntry<V> {
    // == Detach ==
    /// Copies the entry for another cache instance: same value and
    /// timestamps, a new `version` and no reload in flight.
    pub fn detach(&self, version: u64) -> Self {
        Self {
            value: self.value.clone(),
            written_at: self.written_at,
            version,
            accessed_at: Arc::new(Mutex::new(self.accessed_at())),
            reloading: Arc::new(AtomicBool::new(false)),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_entry_creation() {
        let now = Instant::now();
        let entry = CacheEntry::new(Some("v".to_string()), 1, now);

        assert_eq!(entry.value.as_deref(), Some("v"));
        assert_eq!(entry.written_at, now);
        assert_eq!(entry.accessed_at(), now);
        assert!(!entry.is_reloading());
        assert!(entry.is_present());
    }

    #[test]
    fn test_entry_absent_sentinel() {
        let entry: CacheEntry<String> = CacheEntry::new(None, 1, Instant::now());
        assert!(!entry.is_present());
    }

    #[test]
    fn test_touch_only_moves_forward() {
        let start = Instant::now();
        let entry = CacheEntry::new(Some(1), 1, start + Duration::from_millis(10));

        entry.touch(start);
        assert_eq!(entry.accessed_at(), start + Duration::from_millis(10));

        entry.touch(start + Duration::from_millis(20));
        assert_eq!(entry.accessed_at(), start + Duration::from_millis(20));
        assert_eq!(entry.written_at, start + Duration::from_millis(10));
    }

    #[test]
    fn test_clones_share_access_and_reload_state() {
        let start = Instant::now();
        let entry = CacheEntry::new(Some(1), 1, start);
        let handed_out = entry.clone();

        handed_out.touch(start + Duration::from_millis(5));
        assert_eq!(entry.accessed_at(), start + Duration::from_millis(5));

        assert!(handed_out.begin_reload());
        assert!(!entry.begin_reload(), "only one reload may be claimed");
        assert!(entry.is_reloading());

        entry.finish_reload();
        assert!(!handed_out.is_reloading());
    }

    #[test]
    fn test_detach_keeps_timestamps_only() {
        let start = Instant::now();
        let entry = CacheEntry::new(Some(1), 1, start);
        entry.touch(start + Duration::from_millis(30));
        assert!(entry.begin_reload());

        let copy = entry.detach(9);
        assert_eq!(copy.value, Some(1));
        assert_eq!(copy.version, 9);
        assert_eq!(copy.written_at, start);
        assert_eq!(copy.accessed_at(), start + Duration::from_millis(30));
        assert!(!copy.is_reloading());

        copy.touch(start + Duration::from_millis(60));
        assert_eq!(entry.accessed_at(), start + Duration::from_millis(30));
    }
}
