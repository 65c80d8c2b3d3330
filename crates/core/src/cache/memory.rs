//! Bounded in-memory byte cache with TTL and size-driven eviction.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, MemoryEntry>,
    total_bytes: usize,
}

/// Key→bytes store bounded by a total byte budget.
///
/// Expired entries are cleaned lazily on lookup. When an insert would exceed
/// the budget, the soonest-expiring entries are evicted until it fits; a
/// value larger than the whole budget is silently not stored.
pub struct MemoryCache {
    max_bytes: usize,
    inner: RwLock<Inner>,
}

impl MemoryCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        {
            let inner = self.inner.read().await;
            match inner.entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it under the write lock
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.remove(key) {
            if entry.expires_at > Instant::now() {
                // Another writer refreshed the entry in between; put it back
                let value = entry.value.clone();
                inner.entries.insert(key.to_string(), entry);
                return Some(value);
            }
            inner.total_bytes -= entry.value.len();
        }
        None
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        if value.len() > self.max_bytes {
            return;
        }

        let mut inner = self.inner.write().await;

        if let Some(old) = inner.entries.remove(key) {
            inner.total_bytes -= old.value.len();
        }

        while inner.total_bytes + value.len() > self.max_bytes {
            let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            if let Some(evicted) = inner.entries.remove(&victim) {
                inner.total_bytes -= evicted.value.len();
            }
        }

        inner.total_bytes += value.len();
        inner.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub async fn remove(&self, key: &str) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.remove(key) {
            inner.total_bytes -= entry.value.len();
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    pub async fn current_bytes(&self) -> usize {
        self.inner.read().await.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new(1024);
        cache.set("k", b"value".to_vec(), Duration::from_secs(60)).await;

        assert_eq!(cache.get("k").await, Some(b"value".to_vec()));
        assert_eq!(cache.current_bytes().await, 5);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let cache = MemoryCache::new(1024);
        assert!(cache.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = MemoryCache::new(1024);
        cache.set("k", b"value".to_vec(), Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get("k").await.is_none());
        // Lazy clean reclaimed the bytes
        assert_eq!(cache.current_bytes().await, 0);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_oversized_value_not_stored() {
        let cache = MemoryCache::new(8);
        cache.set("k", vec![0u8; 16], Duration::from_secs(60)).await;

        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.current_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_eviction_frees_soonest_expiring_first() {
        let cache = MemoryCache::new(10);
        cache.set("soon", vec![1u8; 4], Duration::from_secs(10)).await;
        cache.set("late", vec![2u8; 4], Duration::from_secs(100)).await;

        // 4 + 4 + 4 > 10, so one entry must go: the soonest-expiring one
        cache.set("new", vec![3u8; 4], Duration::from_secs(50)).await;

        assert!(cache.get("soon").await.is_none());
        assert!(cache.get("late").await.is_some());
        assert!(cache.get("new").await.is_some());
        assert_eq!(cache.current_bytes().await, 8);
    }

    #[tokio::test]
    async fn test_overwrite_adjusts_byte_count() {
        let cache = MemoryCache::new(100);
        cache.set("k", vec![0u8; 40], Duration::from_secs(60)).await;
        cache.set("k", vec![0u8; 10], Duration::from_secs(60)).await;

        assert_eq!(cache.current_bytes().await, 10);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_readers_and_writers() {
        let cache = std::sync::Arc::new(MemoryCache::new(1 << 20));
        let mut handles = Vec::new();

        for i in 0..16 {
            let cache = std::sync::Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let key = format!("key{}", i % 4);
                cache
                    .set(&key, vec![i as u8; 64], Duration::from_secs(60))
                    .await;
                cache.get(&key).await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(cache.len().await, 4);
    }
}
