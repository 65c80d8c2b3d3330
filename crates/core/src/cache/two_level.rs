//! Read-through/write-through composition of the memory and disk tiers.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{DiskCache, MemoryCache};

/// TTL used when repopulating the memory tier from a disk hit; the disk
/// entry keeps its own longer expiry.
const DISK_HIT_MEMORY_TTL: Duration = Duration::from_secs(10 * 60);

/// Two-level cache: memory probed first, disk behind it.
///
/// Writes land in memory synchronously and are flushed to disk by a
/// fire-and-forget task whose failure is logged, never surfaced.
pub struct TwoLevelCache {
    memory: MemoryCache,
    disk: Arc<DiskCache>,
}

impl TwoLevelCache {
    pub fn new(memory: MemoryCache, disk: DiskCache) -> Self {
        Self {
            memory,
            disk: Arc::new(disk),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(value) = self.memory.get(key).await {
            return Some(value);
        }

        let (value, remaining) = self.disk.get(key).await?;
        self.memory
            .set(key, value.clone(), DISK_HIT_MEMORY_TTL.min(remaining))
            .await;
        Some(value)
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.memory.set(key, value.clone(), ttl).await;

        let disk = Arc::clone(&self.disk);
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = disk.set(&key, value, ttl).await {
                warn!(key = %key, error = %e, "Disk cache write-back failed");
            }
        });
    }

    pub async fn remove(&self, key: &str) {
        self.memory.remove(key).await;
        if let Err(e) = self.disk.remove(key).await {
            warn!(key = %key, error = %e, "Disk cache remove failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_with(dir: &TempDir, memory_budget: usize) -> TwoLevelCache {
        TwoLevelCache::new(
            MemoryCache::new(memory_budget),
            DiskCache::new(dir.path()).unwrap(),
        )
    }

    async fn wait_for_disk(cache: &TwoLevelCache, key: &str) {
        for _ in 0..50 {
            if cache.disk.get(key).await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("disk write-back never landed for {key}");
    }

    #[tokio::test]
    async fn test_memory_hit() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, 1024);

        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_read_through_repopulates_memory() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, 1024);

        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
        wait_for_disk(&cache, "k").await;

        // Evict from the memory tier only
        cache.memory.remove("k").await;
        assert_eq!(cache.memory.get("k").await, None);

        // Still served (from disk), and memory is repopulated
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
        assert_eq!(cache.memory.get("k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_miss_everywhere() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, 1024);
        assert!(cache.get("absent").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_clears_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, 1024);

        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
        wait_for_disk(&cache, "k").await;

        cache.remove("k").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_disk_hit_respects_remaining_ttl() {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, 1024);

        cache
            .set("k", b"v".to_vec(), Duration::from_millis(50))
            .await;
        wait_for_disk(&cache, "k").await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Entry expired on disk as well: full miss
        assert!(cache.get("k").await.is_none());
    }
}
