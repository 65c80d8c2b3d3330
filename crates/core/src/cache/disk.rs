//! Durable key→bytes cache, one JSON envelope file per key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::CacheError;

#[derive(Serialize, Deserialize)]
struct DiskEntry {
    expires_at: DateTime<Utc>,
    value: Vec<u8>,
}

/// Key→bytes store that survives process restarts.
///
/// TTL is stored with each entry and enforced on read; expired files are
/// deleted when encountered. No transactional guarantees across keys.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are usually hex digests already, but hashing again keeps
        // arbitrary keys filesystem-safe.
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }

    /// Read a value and its remaining TTL. Expired or unreadable entries
    /// return `None`.
    pub async fn get(&self, key: &str) -> Option<(Vec<u8>, Duration)> {
        let path = self.path_for(key);
        let raw = tokio::fs::read(&path).await.ok()?;

        let entry: DiskEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(_) => {
                // Corrupt file: drop it and miss
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
        };

        let now = Utc::now();
        if entry.expires_at <= now {
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }

        let remaining = (entry.expires_at - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Some((entry.value, remaining))
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = DiskEntry {
            expires_at: Utc::now()
                + chrono::Duration::from_std(ttl)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?,
            value,
        };
        let raw =
            serde_json::to_vec(&entry).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
