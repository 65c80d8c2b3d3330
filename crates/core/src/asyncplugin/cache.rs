//! Per-plugin result cache with scored eviction and crash-safe persistence.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AsyncPluginConfig;
use crate::source::SearchResult;

/// Fraction of the TTL after which a read triggers a background refresh.
const REFRESH_AGE_FRACTION: f64 = 0.8;

/// One cached result set for a `plugin:key` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub results: Vec<SearchResult>,
    /// Creation or last-refresh time.
    pub timestamp: DateTime<Utc>,
    /// Whether the fetch that produced this entry ran to completion.
    pub complete: bool,
    pub last_access: DateTime<Utc>,
    pub access_count: u64,
    /// A refresh for this entry is already in flight.
    #[serde(skip)]
    pub refreshing: bool,
}

/// A fresh cache hit.
pub struct CacheHit {
    pub results: Vec<SearchResult>,
    /// The entry is nearing expiry and nobody is refreshing it yet.
    pub needs_refresh: bool,
}

/// Concurrent cache shared by all async plugin wrappers.
///
/// Keys are namespaced `"<plugin>:<key>"` so plugins never shadow each
/// other at the same fingerprint. The whole map is snapshotted to one JSON
/// blob on a timer and on shutdown; persistence failures never reach the
/// search path.
pub struct AsyncResultCache {
    entries: DashMap<String, CachedEntry>,
    ttl: Duration,
    refresh_after: Duration,
    max_entries: usize,
    persist_path: PathBuf,
    persist_interval: std::time::Duration,
    persist_lock: Mutex<()>,
    dirty: AtomicBool,
}

impl AsyncResultCache {
    pub fn new(config: &AsyncPluginConfig, persist_path: impl Into<PathBuf>) -> Self {
        let ttl_secs = (config.cache_ttl_hours * 3600) as i64;
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs),
            refresh_after: Duration::seconds((ttl_secs as f64 * REFRESH_AGE_FRACTION) as i64),
            max_entries: config.max_cache_entries,
            persist_path: persist_path.into(),
            persist_interval: config.persist_interval(),
            persist_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
        }
    }

    fn entry_key(plugin: &str, key: &str) -> String {
        format!("{}:{}", plugin, key)
    }

    /// Look up a non-expired entry, recording the access.
    pub fn lookup(&self, plugin: &str, key: &str) -> Option<CacheHit> {
        let mut entry = self.entries.get_mut(&Self::entry_key(plugin, key))?;
        let now = Utc::now();
        let age = now - entry.timestamp;
        if age >= self.ttl {
            return None;
        }

        entry.access_count += 1;
        entry.last_access = now;

        Some(CacheHit {
            results: entry.results.clone(),
            needs_refresh: age > self.refresh_after && !entry.refreshing,
        })
    }

    /// Read an entry's results regardless of expiry. Used when the fast
    /// path times out and stale data beats an empty answer.
    pub fn stale(&self, plugin: &str, key: &str) -> Option<Vec<SearchResult>> {
        self.entries
            .get(&Self::entry_key(plugin, key))
            .map(|e| e.results.clone())
    }

    /// Claim the refresh slot for an entry. Returns false when a refresh is
    /// already in flight or the entry vanished.
    pub fn begin_refresh(&self, plugin: &str, key: &str) -> bool {
        match self.entries.get_mut(&Self::entry_key(plugin, key)) {
            Some(mut entry) if !entry.refreshing => {
                entry.refreshing = true;
                true
            }
            _ => false,
        }
    }

    /// Release the refresh slot without storing new results.
    pub fn end_refresh(&self, plugin: &str, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(&Self::entry_key(plugin, key)) {
            entry.refreshing = false;
        }
    }

    /// Store fetch results, merging with any previous entry: every new
    /// result is kept, and old results whose id the new set does not carry
    /// are appended, so long-lived hits survive refreshes.
    pub fn store(&self, plugin: &str, key: &str, results: Vec<SearchResult>, complete: bool) {
        let now = Utc::now();
        let entry_key = Self::entry_key(plugin, key);

        match self.entries.entry(entry_key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.results = merge_results(results, &entry.results);
                entry.timestamp = now;
                entry.complete = complete;
                entry.last_access = now;
                entry.refreshing = false;
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                // Creation counts as the first access so brand-new entries
                // are not immediate eviction victims.
                vacant.insert(CachedEntry {
                    results,
                    timestamp: now,
                    complete,
                    last_access: now,
                    access_count: 1,
                    refreshing: false,
                });
            }
        }

        self.dirty.store(true, Ordering::SeqCst);
        self.evict_if_needed();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Shift an entry's clock backwards to simulate aging.
    #[cfg(test)]
    pub(crate) fn backdate(&self, plugin: &str, key: &str, by: Duration) {
        if let Some(mut entry) = self.entries.get_mut(&Self::entry_key(plugin, key)) {
            entry.timestamp -= by;
            entry.last_access -= by;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove the lowest-scored entries once the soft ceiling is exceeded.
    fn evict_if_needed(&self) {
        let excess = self.entries.len().saturating_sub(self.max_entries);
        if excess == 0 {
            return;
        }

        let now = Utc::now();
        let mut scored: Vec<(String, f64)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), entry_score(e.value(), now)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        for (key, score) in scored.into_iter().take(excess) {
            debug!(key = %key, score, "Evicting cache entry");
            self.entries.remove(&key);
        }
    }

    /// Load the persisted blob, dropping entries already past TTL.
    pub async fn load(&self) -> usize {
        let raw = match tokio::fs::read(&self.persist_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(path = ?self.persist_path, error = %e, "Failed to read cache blob");
                return 0;
            }
        };

        let snapshot: HashMap<String, CachedEntry> = match serde_json::from_slice(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = ?self.persist_path, error = %e, "Failed to parse cache blob");
                return 0;
            }
        };

        let now = Utc::now();
        let mut loaded = 0;
        for (key, entry) in snapshot {
            if now - entry.timestamp >= self.ttl {
                continue;
            }
            self.entries.insert(key, entry);
            loaded += 1;
        }

        info!(entries = loaded, "Async plugin cache loaded");
        loaded
    }

    /// Snapshot the whole map to disk. Overlapping triggers coalesce behind
    /// one mutex so at most one writer is active.
    pub async fn flush(&self) -> Result<(), std::io::Error> {
        let _guard = self.persist_lock.lock().await;

        let snapshot: HashMap<String, CachedEntry> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let raw = serde_json::to_vec(&snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.persist_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.persist_path.with_extension("tmp");
        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, &self.persist_path).await?;

        debug!(entries = snapshot.len(), "Async plugin cache persisted");
        Ok(())
    }

    /// Spawn the interval writer. The task snapshots the cache whenever it
    /// has changed since the previous tick; abort it at shutdown after a
    /// final `flush`.
    pub fn spawn_persist_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.persist_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if cache.dirty.swap(false, Ordering::SeqCst) {
                    if let Err(e) = cache.flush().await {
                        warn!(error = %e, "Periodic cache persistence failed");
                        cache.dirty.store(true, Ordering::SeqCst);
                    }
                }
            }
        })
    }
}

/// Incremental merge: new results first, then old results whose unique id
/// is absent from the new set.
fn merge_results(new: Vec<SearchResult>, old: &[SearchResult]) -> Vec<SearchResult> {
    let seen: HashSet<String> = new.iter().map(|r| r.unique_id.clone()).collect();
    let mut merged = new;
    merged.extend(
        old.iter()
            .filter(|r| !seen.contains(&r.unique_id))
            .cloned(),
    );
    merged
}

/// Retention score: frequently and recently used entries survive, stale
/// idle ones go first.
fn entry_score(entry: &CachedEntry, now: DateTime<Utc>) -> f64 {
    let idle = (now - entry.last_access).num_seconds().max(1) as f64;
    let age = (now - entry.timestamp).num_seconds().max(1) as f64;
    entry.access_count as f64 / (idle * idle * age)
}
