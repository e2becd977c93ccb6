//! Validation result cache
//!
//! Bounded URL → result map with lazy TTL expiry. Entries older than the TTL
//! are evicted when they are looked up; there is no background sweep. When
//! the capacity is reached the least recently used URL is dropped.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// A cached result with the time it was stored
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub url: String,
    pub result: V,
    pub timestamp: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) > ttl
    }
}

/// TTL cache keyed by stream URL
pub struct ValidationCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> ValidationCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached result for `url`, or `None` on a miss or an expired entry
    pub async fn get(&self, url: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        let expired = entries.peek(url)?.is_expired(self.ttl, Instant::now());

        if expired {
            entries.pop(url);
            trace!("Cache entry expired and evicted: {}", url);
            return None;
        }

        entries.get(url).map(|entry| entry.result.clone())
    }

    /// Store a result, replacing any previous entry for the same URL
    pub async fn set(&self, url: &str, result: V) {
        let entry = CacheEntry {
            url: url.to_string(),
            result,
            timestamp: Instant::now(),
        };
        let mut entries = self.entries.lock().await;
        if let Some((evicted, _)) = entries.push(url.to_string(), entry)
            && evicted != url
        {
            trace!("Cache at capacity, evicted least recently used: {}", evicted);
        }
    }

    /// Drop every entry
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        debug!("Validation cache cleared ({} entries)", count);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Evict every expired entry now, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl, now))
            .map(|(url, _)| url.clone())
            .collect();
        for url in &expired {
            entries.pop(url);
        }
        if !expired.is_empty() {
            debug!("Purged {} expired cache entries", expired.len());
        }
        expired.len()
    }
}

impl<V> std::fmt::Debug for ValidationCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
