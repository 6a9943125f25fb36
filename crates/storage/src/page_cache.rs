//! A concurrent, byte-budgeted LRU cache shared by the atom cache and the
//! cloud page cache. Pinned entries (referenced by an in-flight transaction)
//! are never evicted (spec §5).

use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::num::NonZeroUsize;

struct Entry {
    bytes: Vec<u8>,
}

struct Inner {
    order: LruCache<String, Entry>,
    pinned: HashSet<String>,
    bytes_used: usize,
    bytes_budget: usize,
}

/// A byte-budgeted LRU cache keyed by opaque string keys (atom ids as hex,
/// or `"{wal_id}/{offset}"` page keys).
pub struct PageCache {
    inner: Mutex<Inner>,
}

impl PageCache {
    /// Create a cache that evicts once `bytes_budget` would be exceeded.
    pub fn new(bytes_budget: usize) -> Self {
        PageCache {
            inner: Mutex::new(Inner {
                // Capacity is unbounded by count; eviction is governed by
                // `bytes_budget`, so the `LruCache` itself just orders keys.
                order: LruCache::new(NonZeroUsize::new(usize::MAX).unwrap()),
                pinned: HashSet::new(),
                bytes_used: 0,
                bytes_budget,
            }),
        }
    }

    /// Fetch a cached entry's bytes, promoting it to most-recently-used.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.order.get(key).map(|e| e.bytes.clone())
    }

    /// Insert (or overwrite) an entry, evicting least-recently-used
    /// unpinned entries as needed to stay within the byte budget.
    pub fn put(&self, key: String, bytes: Vec<u8>) {
        let mut inner = self.inner.lock();
        let new_len = bytes.len();
        if let Some(old) = inner.order.peek(&key) {
            inner.bytes_used -= old.bytes.len();
        }
        inner.order.put(key.clone(), Entry { bytes });
        inner.bytes_used += new_len;
        Self::evict_to_budget(&mut inner);
    }

    /// Pin `key` so it survives eviction until [`PageCache::unpin`].
    pub fn pin(&self, key: &str) {
        self.inner.lock().pinned.insert(key.to_string());
    }

    /// Release a pin taken by [`PageCache::pin`].
    pub fn unpin(&self, key: &str) {
        let mut inner = self.inner.lock();
        inner.pinned.remove(key);
        Self::evict_to_budget(&mut inner);
    }

    /// Current number of bytes held.
    pub fn bytes_used(&self) -> usize {
        self.inner.lock().bytes_used
    }

    fn evict_to_budget(inner: &mut Inner) {
        if inner.bytes_used <= inner.bytes_budget {
            return;
        }
        // Walk from least- to most-recently-used, skipping pinned keys.
        // Bounded by the cache's own size so a fully-pinned cache simply
        // stops trying rather than looping forever.
        let candidates: Vec<String> = inner.order.iter().rev().map(|(k, _)| k.clone()).collect();
        for key in candidates {
            if inner.bytes_used <= inner.bytes_budget {
                break;
            }
            if inner.pinned.contains(&key) {
                continue;
            }
            if let Some(entry) = inner.order.pop(&key) {
                inner.bytes_used -= entry.bytes.len();
                tracing::trace!(key, "evicted page cache entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_past_budget() {
        let cache = PageCache::new(10);
        cache.put("a".into(), vec![0u8; 6]);
        cache.put("b".into(), vec![0u8; 6]);
        // inserting b pushes total to 12 > 10, so a (LRU) should be evicted
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn pinned_entries_survive_eviction_pressure() {
        let cache = PageCache::new(10);
        cache.put("a".into(), vec![0u8; 6]);
        cache.pin("a");
        cache.put("b".into(), vec![0u8; 6]);
        assert!(cache.get("a").is_some(), "pinned entry must not be evicted");
        cache.unpin("a");
        cache.put("c".into(), vec![0u8; 6]);
        assert!(cache.get("a").is_none(), "unpinned entry is now evictable");
    }
}
