//! Classification cache keyed by (normalized description, flow)
//!
//! A bounded, TTL-based store of prior high-confidence classifications,
//! consulted between the rule engine and the AI fallback so repeated
//! merchants never pay for a second model call.
//!
//! The cache is an explicitly constructed, injectable component; tests and
//! multi-tenant servers instantiate isolated instances. Reads never mutate
//! entries; expired entries are only removed by the explicit `clean()`
//! operator action.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::models::Flow;
use crate::normalize::normalize;

/// Classifications below this confidence are never cached
pub const MIN_CACHE_CONFIDENCE: f64 = 0.7;

const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_TTL_DAYS: i64 = 7;

type CacheKey = (String, Flow);

/// A cached classification for one (description, flow) pair
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub category_id: String,
    pub category_name: String,
    pub confidence: f64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub total_hits: u64,
    pub total_misses: u64,
    pub hit_rate: f64,
    pub ttl_days: i64,
}

struct CacheInner {
    map: HashMap<CacheKey, CacheEntry>,
    /// Insertion order for FIFO eviction at capacity
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

/// Bounded TTL cache, safe for concurrent use from batch workers
pub struct ClassificationCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL_DAYS)
    }
}

impl ClassificationCache {
    pub fn new(capacity: usize, ttl_days: i64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
            capacity,
            ttl: Duration::days(ttl_days),
        }
    }

    fn key(description: &str, flow: Flow) -> CacheKey {
        (normalize(description), flow)
    }

    /// Look up a prior classification. Expired entries count as misses but
    /// are left in place for `clean()` to collect.
    pub fn get(&self, description: &str, flow: Flow) -> Option<CacheEntry> {
        let key = Self::key(description, flow);
        let mut inner = self.inner.lock().unwrap();

        let hit = inner
            .map
            .get(&key)
            .filter(|entry| Utc::now() - entry.created_at < self.ttl)
            .cloned();

        match hit {
            Some(entry) => {
                inner.hits += 1;
                Some(entry)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a classification. Returns false (and stores nothing) below the
    /// confidence floor. Existing entries for the same key are replaced,
    /// oldest entries are evicted at capacity.
    pub fn put(
        &self,
        description: &str,
        flow: Flow,
        category_id: &str,
        category_name: &str,
        confidence: f64,
        reason: &str,
    ) -> bool {
        if confidence < MIN_CACHE_CONFIDENCE {
            debug!(
                confidence,
                "Skipping cache write below confidence floor"
            );
            return false;
        }

        let key = Self::key(description, flow);
        let mut inner = self.inner.lock().unwrap();

        if !inner.map.contains_key(&key) {
            while inner.map.len() >= self.capacity {
                match inner.order.pop_front() {
                    Some(oldest) => {
                        inner.map.remove(&oldest);
                    }
                    None => break,
                }
            }
            inner.order.push_back(key.clone());
        }

        inner.map.insert(
            key,
            CacheEntry {
                category_id: category_id.to_string(),
                category_name: category_name.to_string(),
                confidence,
                reason: reason.to_string(),
                created_at: Utc::now(),
            },
        );
        true
    }

    /// Remove expired entries. Explicit operator action, returns the number
    /// of entries removed.
    pub fn clean(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let ttl = self.ttl;

        let before = inner.map.len();
        inner.map.retain(|_, entry| now - entry.created_at < ttl);
        let removed = before - inner.map.len();

        let map = std::mem::take(&mut inner.map);
        inner.order.retain(|key| map.contains_key(key));
        inner.map = map;

        debug!(removed, "Cleaned expired cache entries");
        removed
    }

    /// Empty the store entirely. Counters survive so hit-rate history is
    /// not lost.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            size: inner.map.len(),
            capacity: self.capacity,
            total_hits: inner.hits,
            total_misses: inner.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            ttl_days: self.ttl.num_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(cache: &ClassificationCache, desc: &str, flow: Flow, confidence: f64) -> bool {
        cache.put(desc, flow, "cat-1", "Streaming", confidence, "looks like streaming")
    }

    #[test]
    fn test_write_gate_on_confidence_floor() {
        let cache = ClassificationCache::default();

        assert!(!put(&cache, "NETFLIX.COM", Flow::Debit, 0.65));
        assert!(cache.get("NETFLIX.COM", Flow::Debit).is_none());

        assert!(put(&cache, "NETFLIX.COM", Flow::Debit, 0.75));
        let entry = cache.get("NETFLIX.COM", Flow::Debit).unwrap();
        assert_eq!(entry.category_id, "cat-1");
        assert_eq!(entry.confidence, 0.75);
    }

    #[test]
    fn test_key_uses_normalized_description() {
        let cache = ClassificationCache::default();
        put(&cache, "Netflix.com  BR", Flow::Debit, 0.9);

        // Same merchant, different casing and spacing
        assert!(cache.get("NETFLIX.COM BR", Flow::Debit).is_some());
        // Different flow is a different key
        assert!(cache.get("NETFLIX.COM BR", Flow::Credit).is_none());
    }

    #[test]
    fn test_expired_entries_miss_but_stay_until_clean() {
        let cache = ClassificationCache::new(10, 0); // zero-day TTL: instant expiry
        put(&cache, "NETFLIX", Flow::Debit, 0.9);

        assert!(cache.get("NETFLIX", Flow::Debit).is_none());
        // Read did not mutate the store
        assert_eq!(cache.stats().size, 1);

        assert_eq!(cache.clean(), 1);
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let cache = ClassificationCache::new(2, 7);
        put(&cache, "FIRST", Flow::Debit, 0.9);
        put(&cache, "SECOND", Flow::Debit, 0.9);
        put(&cache, "THIRD", Flow::Debit, 0.9);

        assert_eq!(cache.stats().size, 2);
        assert!(cache.get("FIRST", Flow::Debit).is_none());
        assert!(cache.get("SECOND", Flow::Debit).is_some());
        assert!(cache.get("THIRD", Flow::Debit).is_some());
    }

    #[test]
    fn test_replacing_entry_does_not_grow_order_queue() {
        let cache = ClassificationCache::new(2, 7);
        put(&cache, "SAME", Flow::Debit, 0.8);
        put(&cache, "SAME", Flow::Debit, 0.9);
        put(&cache, "OTHER", Flow::Debit, 0.9);

        assert_eq!(cache.stats().size, 2);
        assert_eq!(cache.get("SAME", Flow::Debit).unwrap().confidence, 0.9);
        assert!(cache.get("OTHER", Flow::Debit).is_some());
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = ClassificationCache::default();
        put(&cache, "NETFLIX", Flow::Debit, 0.9);

        cache.get("NETFLIX", Flow::Debit); // hit
        cache.get("UNKNOWN", Flow::Debit); // miss
        cache.get("NETFLIX", Flow::Debit); // hit

        let stats = cache.stats();
        assert_eq!(stats.total_hits, 2);
        assert_eq!(stats.total_misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clear_empties_store() {
        let cache = ClassificationCache::default();
        put(&cache, "NETFLIX", Flow::Debit, 0.9);
        put(&cache, "SPOTIFY", Flow::Debit, 0.9);

        cache.clear();
        assert_eq!(cache.stats().size, 0);
        assert!(cache.get("NETFLIX", Flow::Debit).is_none());
    }
}
