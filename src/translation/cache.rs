// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded cache of successful translations

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Default number of cached translations
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// LRU cache keyed by `(text, target code)`
pub struct TranslationCache {
    cache: Mutex<LruCache<(String, String), String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl TranslationCache {
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(text: &str, code: &str) -> (String, String) {
        (text.to_string(), code.to_string())
    }

    pub fn get(&self, text: &str, code: &str) -> Option<String> {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        let found = cache.get(&Self::key(text, code)).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, text: &str, code: &str, translated: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.put(Self::key(text, code), translated.to_string());
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        CacheStats {
            entries: cache.len(),
            capacity: cache.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = TranslationCache::new(10);
        cache.insert("a dog", "es", "un perro");

        assert_eq!(cache.get("a dog", "es").as_deref(), Some("un perro"));
        assert_eq!(cache.get("a dog", "fr"), None);

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_key_is_exact_text() {
        let cache = TranslationCache::new(10);
        cache.insert("A dog", "es", "Un perro");
        assert_eq!(cache.get("a dog", "es"), None);
    }

    #[test]
    fn test_eviction_is_least_recently_used() {
        let cache = TranslationCache::new(2);
        cache.insert("one", "es", "uno");
        cache.insert("two", "es", "dos");
        assert!(cache.get("one", "es").is_some());
        cache.insert("three", "es", "tres");

        assert!(cache.get("two", "es").is_none());
        assert!(cache.get("one", "es").is_some());
        assert!(cache.get("three", "es").is_some());
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let cache = TranslationCache::new(0);
        assert_eq!(cache.stats().capacity, 1);
    }

    #[test]
    fn test_clear() {
        let cache = TranslationCache::new(4);
        cache.insert("x", "de", "y");
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }
}
