//! Process-local TTL cache with LRU eviction.
//!
//! Used for per-user preferences and assembled system prompts. Entries
//! expire after a fixed TTL; when the cache is full the least recently
//! used entry is evicted. There is no cross-process coherence.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A bounded map whose entries expire after `ttl`.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    /// Insertion order doubles as recency order; the front is evicted first.
    entries: RwLock<IndexMap<K, Entry<V>>>,
    /// Bumped by every invalidation, under the write lock.
    generation: AtomicU64,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries for `ttl` each.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            generation: AtomicU64::new(0),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Get a live value, marking it as recently used.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write().await;

        let entry = entries.shift_remove(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }

        let value = entry.value.clone();
        entries.insert(key.clone(), entry);
        Some(value)
    }

    /// Insert or replace a value, evicting the least recently used entries
    /// when over capacity.
    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        self.insert_locked(&mut entries, key, value);
    }

    fn insert_locked(&self, entries: &mut IndexMap<K, Entry<V>>, key: K, value: V) {
        entries.shift_remove(&key);
        entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );

        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    /// Remove a key.
    pub async fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.shift_remove(key);
    }

    /// Remove every key matching `predicate`.
    pub async fn invalidate_where(&self, predicate: impl Fn(&K) -> bool) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.retain(|key, _| !predicate(key));
    }

    /// Return the cached value, or compute, cache and return it.
    ///
    /// Errors from `init` are returned and nothing is cached. A value
    /// computed while an invalidation ran is returned but not cached, since
    /// it may have been built from data that changed. Concurrent misses may
    /// both run `init`; the last insert wins.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let value = init().await?;

        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            self.insert_locked(&mut entries, key, value.clone());
        }
        Ok(value)
    }

    /// Number of entries, including expired ones not yet dropped.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = TtlCache::new(Duration::from_secs(60), 10);
        cache.insert("a".to_string(), 1).await;

        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        assert_eq!(cache.get(&"b".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = TtlCache::new(Duration::from_millis(20), 10);
        cache.insert("a", 1).await;

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get(&"a").await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;

        // Touch "a" so "b" becomes least recently used.
        assert_eq!(cache.get(&"a").await, Some(1));
        cache.insert("c", 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&"b").await, None);
        assert_eq!(cache.get(&"a").await, Some(1));
        assert_eq!(cache.get(&"c").await, Some(3));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = TtlCache::new(Duration::from_secs(60), 10);
        cache.insert(("u1", 1), "x").await;
        cache.insert(("u1", 2), "y").await;
        cache.insert(("u2", 1), "z").await;

        cache.invalidate(&("u2", 1)).await;
        assert_eq!(cache.get(&("u2", 1)).await, None);

        cache.invalidate_where(|(user, _)| *user == "u1").await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_or_try_insert_with() {
        let cache = TtlCache::new(Duration::from_secs(60), 10);
        let calls = &AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<i32, ()> = cache
                .get_or_try_insert_with("k", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let failed: Result<i32, &str> = cache
            .get_or_try_insert_with("other", || async { Err("nope") })
            .await;
        assert_eq!(failed, Err("nope"));
        assert_eq!(cache.get(&"other").await, None);
    }

    #[tokio::test]
    async fn test_value_computed_across_invalidation_is_not_cached() {
        let cache = &TtlCache::new(Duration::from_secs(60), 10);

        let value: Result<&str, ()> = cache
            .get_or_try_insert_with(("u1", 1), || async move {
                // The user's data changes while the old value is being built.
                cache.invalidate_where(|(user, _)| *user == "u1").await;
                Ok("stale")
            })
            .await;
        assert_eq!(value, Ok("stale"));
        assert_eq!(cache.get(&("u1", 1)).await, None);

        let value: Result<&str, ()> = cache
            .get_or_try_insert_with(("u1", 1), || async { Ok("fresh") })
            .await;
        assert_eq!(value, Ok("fresh"));
        assert_eq!(cache.get(&("u1", 1)).await, Some("fresh"));
    }
}
