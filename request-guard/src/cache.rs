use crate::{key::RequestKey, response::ResponseHandle};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Cached response with its expiry
#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub handle: ResponseHandle,
    pub expires_at: Instant,
}

impl CachedResponse {
    /// Check if the cached response is still valid at `now`
    pub fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory response cache bounded by time only.
///
/// Expired entries read as absent and are evicted by whoever observes them.
#[derive(Default)]
pub struct TtlCache {
    cache: DashMap<RequestKey, CachedResponse>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Get the cached response if present and not expired at `now`
    pub fn lookup(&self, key: &RequestKey, now: Instant) -> Option<ResponseHandle> {
        if let Some(cached) = self.cache.get(key) {
            if cached.is_valid(now) {
                log::debug!("Cache hit for key: {}", key);
                return Some(Arc::clone(&cached.handle));
            }
        } else {
            log::debug!("Cache miss for key: {}", key);
            return None;
        }

        // Only evict what is still expired, a fresh insert may have raced us
        log::debug!("Cache expired for key: {}", key);
        self.cache
            .remove_if(key, |_, cached| !cached.is_valid(now));
        None
    }

    /// Store `handle` under `key` until `expires_at`
    pub fn insert(&self, key: RequestKey, handle: ResponseHandle, expires_at: Instant) {
        log::debug!("Stored in cache with key: {}", key);
        self.cache.insert(key, CachedResponse { handle, expires_at });
    }

    /// Remove expired entries from cache
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, cached| cached.is_valid(now));
        let evicted = before.saturating_sub(self.cache.len());

        log::debug!("Evicted {} expired cache entries", evicted);
        evicted
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        self.cache.clear();
        log::info!("Response cache cleared");
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self, now: Instant) -> CacheStats {
        let total_entries = self.cache.len();
        let expired_entries = self
            .cache
            .iter()
            .filter(|entry| !entry.value().is_valid(now))
            .count();

        CacheStats {
            total_entries,
            valid_entries: total_entries.saturating_sub(expired_entries),
            expired_entries,
        }
    }

    /// Periodically evicts expired entries until the cache is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.evict_expired(Instant::now());
                    }
                    None => break,
                }
            }
            log::debug!("Cache sweeper stopped");
        })
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}

/// Thread-safe wrapper for the cache
pub type SharedTtlCache = Arc<TtlCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::HttpResponse;

    fn key(s: &str) -> RequestKey {
        RequestKey::explicit(s)
    }

    fn handle(body: &'static str) -> ResponseHandle {
        Arc::new(HttpResponse::new(200, body).into())
    }

    #[test]
    fn test_lookup_respects_expiry() {
        let cache = TtlCache::new();
        let now = Instant::now();
        cache.insert(key("a"), handle("one"), now + Duration::from_secs(1));

        let hit = cache.lookup(&key("a"), now).unwrap();
        assert_eq!(hit.readable_copy().body, "one");
        assert!(cache.lookup(&key("b"), now).is_none());

        assert!(cache
            .lookup(&key("a"), now + Duration::from_secs(1))
            .is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_lookup_keeps_fresh_entry() {
        let cache = TtlCache::new();
        let now = Instant::now();
        cache.insert(key("a"), handle("fresh"), now + Duration::from_secs(10));

        // A reader with a later clock sees it expired but must not evict a newer insert
        assert!(cache
            .lookup(&key("a"), now + Duration::from_secs(11))
            .is_none());
        cache.insert(key("a"), handle("newer"), now + Duration::from_secs(20));
        assert!(cache.lookup(&key("a"), now + Duration::from_secs(12)).is_some());
    }

    #[test]
    fn test_evict_expired_and_stats() {
        let cache = TtlCache::new();
        let now = Instant::now();
        cache.insert(key("old"), handle("x"), now);
        cache.insert(key("new"), handle("y"), now + Duration::from_secs(5));

        assert_eq!(
            cache.stats(now),
            CacheStats {
                total_entries: 2,
                valid_entries: 1,
                expired_entries: 1,
            }
        );
        assert_eq!(cache.evict_expired(now), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_in_background() {
        let cache = Arc::new(TtlCache::new());
        cache.insert(
            key("a"),
            handle("x"),
            Instant::now() + Duration::from_millis(50),
        );
        let sweeper = cache.spawn_sweeper(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(cache.is_empty());

        drop(cache);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(sweeper.await.is_ok());
    }
}
