//! Result cache - settled thumbnails keyed by normalized video path.
//!
//! Pure data: one `Mutex<HashMap>` plus hit/miss counters. Entries are written
//! once per key between resets and never evicted; the scheduler serializes
//! access together with its in-flight map.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use super::entry::CacheEntry;
use super::key::ThumbKey;

/// Cache statistics for monitoring hit rate
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self, size: usize) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            size,
        }
    }
}

/// Plain-value copy of the cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

/// Map from key to settled entry (thumbnail or placeholder)
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<ThumbKey, CacheEntry>>,
    stats: CacheStats,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure lookup, no side effects.
    pub fn get(&self, key: &ThumbKey) -> Option<CacheEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Lookup that also feeds the hit/miss statistics.
    pub fn lookup(&self, key: &ThumbKey) -> Option<CacheEntry> {
        let result = self.get(key);
        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        result
    }

    pub fn contains(&self, key: &ThumbKey) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Insert or overwrite the entry for `key`.
    pub fn put(&self, key: ThumbKey, entry: CacheEntry) {
        debug!(
            "Cached {}: {}",
            if entry.is_placeholder() { "placeholder" } else { "thumbnail" },
            key
        );
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
    }

    /// Drop every entry. Returns how many were removed.
    pub fn reset(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let cleared = entries.len();
        entries.clear();
        self.stats.reset();
        debug!("ResultCache reset: {} entries cleared", cleared);
        cleared
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::ThumbRef;
    use crate::core::error::RenderError;

    #[test]
    fn test_get_is_pure() {
        let cache = ResultCache::new();
        let key = ThumbKey::new("/v/a.mp4");
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.stats().misses, 0);

        assert!(cache.lookup(&key).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_put_then_lookup_hits() {
        let cache = ResultCache::new();
        let key = ThumbKey::new("/v/a.mp4");
        cache.put(key.clone(), CacheEntry::Ready(ThumbRef::from("thumb-a")));

        let entry = cache.lookup(&key).unwrap();
        assert_eq!(entry.thumb().as_str(), "thumb-a");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = ResultCache::new();
        let key = ThumbKey::new("/v/a.mp4");
        cache.put(key.clone(), CacheEntry::from_result(Err(RenderError::other("x"))));
        cache.put(key.clone(), CacheEntry::Ready(ThumbRef::from("thumb-a")));
        assert!(!cache.get(&key).unwrap().is_placeholder());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reset_clears_entries_and_stats() {
        let cache = ResultCache::new();
        cache.put(ThumbKey::new("/v/a.mp4"), CacheEntry::Ready(ThumbRef::from("a")));
        cache.put(ThumbKey::new("/v/b.mp4"), CacheEntry::Ready(ThumbRef::from("b")));
        cache.lookup(&ThumbKey::new("/v/a.mp4"));

        assert_eq!(cache.reset(), 2);
        assert!(cache.is_empty());
        assert!(!cache.contains(&ThumbKey::new("/v/a.mp4")));
        assert_eq!(cache.stats(), CacheStatsSnapshot::default());
    }
}
