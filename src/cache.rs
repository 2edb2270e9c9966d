//! Bounded, time-expiring route cache.
//!
//! LRU with touch-on-read: a hit refreshes recency but not the TTL, which always counts
//! from insertion. Expired entries are removed on lookup and never served.

use crate::tenant::{Route, TenantKey};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Clone, Debug)]
pub struct RouteCacheEntry {
    pub route: Arc<Route>,
    pub inserted_at: Instant,
}

impl RouteCacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

pub struct RouteCache {
    entries: Mutex<LruCache<TenantKey, RouteCacheEntry>>,
    ttl: Duration,
}

impl RouteCache {
    /// A zero capacity is bumped to one; config validation rejects it earlier.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        RouteCache {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    // The guarded map is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, LruCache<TenantKey, RouteCacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get_entry(&self, key: &TenantKey) -> Option<RouteCacheEntry> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            tracing::debug!(tenant = %key, "route cache entry expired");
        }
        None
    }

    pub fn get(&self, key: &TenantKey) -> Option<Arc<Route>> {
        self.get_entry(key).map(|e| e.route)
    }

    /// Insert or replace; evicts the least recently used entry when full.
    pub fn insert(&self, key: TenantKey, route: Arc<Route>) {
        let entry = RouteCacheEntry {
            route,
            inserted_at: Instant::now(),
        };
        if let Some((evicted, _)) = self.lock().push(key.clone(), entry) {
            if evicted != key {
                tracing::debug!(tenant = %evicted, "route cache evicted least recently used entry");
            }
        }
    }

    pub fn remove(&self, key: &TenantKey) -> bool {
        self.lock().pop(key).is_some()
    }

    /// Entry count, including entries that have expired but not yet been looked up.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for RouteCache {
    fn default() -> Self {
        RouteCache::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn route(key: &str) -> Arc<Route> {
        Arc::new(Route {
            tenant_key: TenantKey::parse(key).unwrap(),
            host: "db.internal".into(),
            port: 3306,
            database_user: "reporter".into(),
            database_secret: SecretString::from("pw".to_string()),
            database_name: key.to_lowercase(),
        })
    }

    fn key(k: &str) -> TenantKey {
        TenantKey::parse(k).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_served_until_ttl_then_dropped() {
        let cache = RouteCache::new(10, Duration::from_secs(300));
        cache.insert(key("pts"), route("pts"));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get(&key("pts")).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key("pts")).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_extend_ttl() {
        let cache = RouteCache::new(10, Duration::from_secs(60));
        cache.insert(key("pts"), route("pts"));
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(10)).await;
            assert!(cache.get(&key("pts")).is_some());
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.get(&key("pts")).is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = RouteCache::new(2, Duration::from_secs(60));
        cache.insert(key("a"), route("a"));
        cache.insert(key("b"), route("b"));
        // Touch A so B becomes the eviction candidate.
        assert!(cache.get(&key("a")).is_some());
        cache.insert(key("c"), route("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("c")).is_some());
    }

    #[tokio::test]
    async fn reinsert_replaces_without_growing() {
        let cache = RouteCache::new(4, Duration::from_secs(60));
        cache.insert(key("pts"), route("pts"));
        cache.insert(key("pts"), route("pts"));
        assert_eq!(cache.len(), 1);
        assert!(cache.remove(&key("pts")));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn concurrent_inserts_respect_capacity() {
        let cache = Arc::new(RouteCache::new(8, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for i in 0..64 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let k = format!("brand{}", i);
                cache.insert(key(&k), route(&k));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(cache.len(), 8);
    }
}
