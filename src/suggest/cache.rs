// SPDX-License-Identifier: MIT
// Suggestion LRU cache.
//
// Caches post-processed suggestions so identical cursor positions skip the
// upstream round-trip. Key = SHA-256( source line + first 640 bytes of the
// context window ). Capacity: 256 entries.

use std::collections::HashMap;
use std::collections::VecDeque;

use sha2::{Digest, Sha256};

/// An entry stored in the suggestion cache.
#[derive(Clone)]
pub struct CacheEntry {
    pub text: String,
    pub created_at: std::time::Instant,
}

/// LRU cache for suggestion results.
///
/// Thread-safety: wrap in `Mutex<SuggestCache>` for shared use.
pub struct SuggestCache {
    capacity: usize,
    map: HashMap<String, CacheEntry>,
    /// Key insertion order (front = oldest, back = newest).
    order: VecDeque<String>,
    pub hits: u64,
    pub misses: u64,
}

impl SuggestCache {
    /// Create a new cache with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Compute the cache key for a source line and its context window.
    /// Hashes raw bytes, so multi-byte text never needs boundary care.
    pub fn cache_key(source_line: &str, context: &str) -> String {
        let ctx = context.as_bytes();
        let ctx_slice = if ctx.len() > 640 { &ctx[..640] } else { ctx };

        let mut hasher = Sha256::new();
        hasher.update(source_line.as_bytes());
        hasher.update(b"\0");
        hasher.update(ctx_slice);
        format!("{:x}", hasher.finalize())
    }

    /// Look up a cache entry. Returns `Some(entry)` on hit.
    pub fn get(&mut self, key: &str) -> Option<&CacheEntry> {
        if self.map.contains_key(key) {
            // Move to back (most recently used).
            self.order.retain(|k| k != key);
            self.order.push_back(key.to_string());
            self.hits += 1;
            self.map.get(key)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Insert a new entry. Evicts the least-recently-used entry if at capacity.
    pub fn insert(&mut self, key: String, entry: CacheEntry) {
        if self.map.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else if self.map.len() >= self.capacity {
            if let Some(evict) = self.order.pop_front() {
                self.map.remove(&evict);
            }
        }
        self.order.push_back(key.clone());
        self.map.insert(key, entry);
    }

    /// Hit rate as a value 0.0–1.0.  Returns 0.0 if no requests yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> CacheEntry {
        CacheEntry {
            text: text.to_string(),
            created_at: std::time::Instant::now(),
        }
    }

    #[test]
    fn cache_key_deterministic() {
        let k1 = SuggestCache::cache_key("let x =", "fn main() {\nlet x =\n}");
        let k2 = SuggestCache::cache_key("let x =", "fn main() {\nlet x =\n}");
        assert_eq!(k1, k2);
    }

    #[test]
    fn cache_key_differs_on_context_change() {
        let k1 = SuggestCache::cache_key("let x =", "context one");
        let k2 = SuggestCache::cache_key("let x =", "context two");
        assert_ne!(k1, k2);
    }

    #[test]
    fn cache_key_handles_multibyte_context() {
        let ctx = "é".repeat(800);
        let key = SuggestCache::cache_key("line", &ctx);
        assert_eq!(key.len(), 64);
    }

    #[test]
    fn cache_hit_and_miss() {
        let mut cache = SuggestCache::new(4);
        let key = SuggestCache::cache_key("line", "ctx");
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.misses, 1);

        cache.insert(key.clone(), entry(" 1;"));
        assert_eq!(cache.get(&key).map(|e| e.text.as_str()), Some(" 1;"));
        assert_eq!(cache.hits, 1);
    }

    #[test]
    fn cache_evicts_lru() {
        let mut cache = SuggestCache::new(2);
        cache.insert("key1".to_string(), entry("a"));
        cache.insert("key2".to_string(), entry("b"));
        // key1 is LRU — inserting key3 should evict key1
        cache.insert("key3".to_string(), entry("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.map.contains_key("key2"));
        assert!(cache.map.contains_key("key3"));
        assert!(!cache.map.contains_key("key1"));
    }

    #[test]
    fn hit_rate_calculation() {
        let mut cache = SuggestCache::new(4);
        assert_eq!(cache.hit_rate(), 0.0);

        let k = SuggestCache::cache_key("a", "b");
        cache.get(&k); // miss
        cache.insert(k.clone(), entry("x"));
        cache.get(&k); // hit
        assert!((cache.hit_rate() - 0.5).abs() < 1e-9);
    }
}
