use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use http::HeaderMap;

/// `"{variant}:{absoluteURL}"` (spec.md §3 "CacheKey").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn direct(url: &str) -> Self {
        CacheKey(format!("direct:{url}"))
    }

    pub fn headless(url: &str) -> Self {
        CacheKey(format!("headless:{url}"))
    }
}

/// Renderer that produced a response, surfaced in both `ProxyResult` and
/// the `x-renderer` response header (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renderer {
    Direct,
    Headless,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: http::StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub renderer: Renderer,
    pub added_at: Instant,
}

/// `DashMap`-backed response cache keyed by `CacheKey` (spec.md §4.6).
///
/// Disabled entirely (every `lookup` misses, every `insert` is a no-op) when
/// constructed with a non-positive TTL, matching "configuration-disabled
/// when TTL <= 0".
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    high_water: usize,
    low_water: usize,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(ttl_ms: i64, high_water: usize, low_water: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
            high_water,
            low_water,
            enabled: ttl_ms > 0,
        }
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        let entry = self.entries.get(key)?;
        if entry.added_at.elapsed() < self.ttl {
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Insert an entry, replacing any prior one, then run the bounded
    /// eviction sweep if the cache is now at or above the high-water mark.
    pub fn insert(&self, key: CacheKey, entry: CacheEntry) {
        if !self.enabled {
            return;
        }
        self.entries.insert(key, entry);
        if self.entries.len() >= self.high_water {
            self.evict();
        }
    }

    /// Single bounded linear pass: first drop everything past its TTL, then
    /// if still above `low_water`, keep dropping (insertion order is not
    /// tracked, so this falls back to arbitrary map order) until at target.
    /// Never more than one full scan of the map, so this stays O(n).
    fn evict(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.added_at.elapsed() < ttl);

        if self.entries.len() <= self.low_water {
            return;
        }
        let mut overflow = self.entries.len() - self.low_water;
        let mut doomed = Vec::with_capacity(overflow);
        for item in self.entries.iter() {
            if overflow == 0 {
                break;
            }
            doomed.push(item.key().clone());
            overflow -= 1;
        }
        for key in doomed {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(body: &str) -> CacheEntry {
        CacheEntry {
            status: http::StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
            renderer: Renderer::Direct,
            added_at: Instant::now(),
        }
    }

    #[test]
    fn disabled_cache_never_stores() {
        let cache = ResponseCache::new(0, 200, 150);
        cache.insert(CacheKey::direct("https://a/"), entry("x"));
        assert!(cache.lookup(&CacheKey::direct("https://a/")).is_none());
    }

    #[test]
    fn hit_then_miss_after_ttl() {
        let cache = ResponseCache::new(50, 200, 150);
        let key = CacheKey::direct("https://a/");
        cache.insert(key.clone(), entry("x"));
        assert!(cache.lookup(&key).is_some());
        std::thread::sleep(Duration::from_millis(80));
        assert!(cache.lookup(&key).is_none());
    }

    #[test]
    fn eviction_brings_size_to_low_water() {
        let cache = ResponseCache::new(60_000, 4, 2);
        for i in 0..4 {
            cache.insert(CacheKey::direct(&format!("https://a/{i}")), entry("x"));
        }
        assert!(cache.len() <= 2);
    }

    #[test]
    fn insert_replaces_prior_entry() {
        let cache = ResponseCache::new(60_000, 200, 150);
        let key = CacheKey::direct("https://a/");
        cache.insert(key.clone(), entry("first"));
        cache.insert(key.clone(), entry("second"));
        assert_eq!(cache.lookup(&key).unwrap().body, Bytes::from("second"));
    }
}
