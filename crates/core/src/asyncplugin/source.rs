//! Dual-channel decorator over plugin sources.
//!
//! A wrapped plugin answers from its cache when it can. On a miss the real
//! fetch starts immediately, but the caller only waits for a short response
//! deadline; if the fetch is still running when that expires, the caller
//! gets stale or empty results and the fetch keeps going in the background,
//! updating the cache for the next request.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, warn};

use crate::cache::keyword_digest;
use crate::config::AsyncPluginConfig;
use crate::source::{SearchError, SearchResult, SearchSource};

use super::cache::AsyncResultCache;

/// Admission control for background work, shared by all wrapped plugins.
///
/// Two counters: a semaphore bounding how many background fetches run at
/// once, and a hard ceiling on fetches admitted but not yet finished.
/// Admission is decided immediately (full ceiling → declined, never
/// queued); admitted tasks wait for a semaphore slot inside the spawned
/// task.
pub struct WorkerBudget {
    workers: Arc<Semaphore>,
    outstanding: Arc<AtomicUsize>,
    max_outstanding: usize,
}

impl WorkerBudget {
    pub fn new(max_workers: usize, max_outstanding: usize) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
            outstanding: Arc::new(AtomicUsize::new(0)),
            max_outstanding,
        }
    }

    /// Reserve an outstanding-task slot. The slot is released when the
    /// returned guard drops, which covers error and timeout paths.
    pub fn try_reserve(&self) -> Option<TaskSlot> {
        self.outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_outstanding).then_some(n + 1)
            })
            .ok()?;
        Some(TaskSlot {
            outstanding: Arc::clone(&self.outstanding),
        })
    }

    /// Number of admitted tasks that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn workers(&self) -> Arc<Semaphore> {
        Arc::clone(&self.workers)
    }
}

/// Guard for one outstanding background task.
pub struct TaskSlot {
    outstanding: Arc<AtomicUsize>,
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cache-and-refresh wrapper implementing `SearchSource` over another
/// `SearchSource`.
pub struct AsyncSearchSource {
    inner: Arc<dyn SearchSource>,
    cache: Arc<AsyncResultCache>,
    budget: Arc<WorkerBudget>,
    response_timeout: Duration,
    processing_timeout: Duration,
}

impl AsyncSearchSource {
    pub fn new(
        inner: Arc<dyn SearchSource>,
        cache: Arc<AsyncResultCache>,
        budget: Arc<WorkerBudget>,
        config: &AsyncPluginConfig,
    ) -> Self {
        Self {
            inner,
            cache,
            budget,
            response_timeout: config.response_timeout(),
            processing_timeout: config.processing_timeout(),
        }
    }

    /// Start a background refresh for a near-expiry entry, if the budget
    /// admits one and nobody is refreshing it already.
    fn spawn_refresh(&self, keyword: &str, key: &str) {
        let name = self.inner.name();
        if !self.cache.begin_refresh(name, key) {
            return;
        }
        let Some(slot) = self.budget.try_reserve() else {
            self.cache.end_refresh(name, key);
            debug!(plugin = name, "Background refresh declined, budget exhausted");
            return;
        };

        let workers = self.budget.workers();
        let inner = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);
        let keyword = keyword.to_string();
        let key = key.to_string();
        let processing_timeout = self.processing_timeout;

        tokio::spawn(async move {
            let _slot = slot;
            let name = inner.name().to_string();
            let Ok(_permit) = workers.acquire_owned().await else {
                cache.end_refresh(&name, &key);
                return;
            };

            match tokio::time::timeout(processing_timeout, inner.search(&keyword)).await {
                Ok(Ok(results)) => cache.store(&name, &key, results, true),
                Ok(Err(e)) => {
                    warn!(plugin = %name, error = %e, "Background refresh failed");
                    cache.end_refresh(&name, &key);
                }
                Err(_) => {
                    warn!(plugin = %name, "Background refresh timed out");
                    cache.end_refresh(&name, &key);
                }
            }
        });
    }

    /// Cache miss: run the real fetch in a task that outlives this call,
    /// and race it against the response deadline.
    async fn dual_channel_search(
        &self,
        keyword: &str,
        key: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let (tx, rx) = oneshot::channel();

        let inner = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);
        let keyword_owned = keyword.to_string();
        let key_owned = key.to_string();
        let processing_timeout = self.processing_timeout;

        tokio::spawn(async move {
            let name = inner.name().to_string();
            let outcome =
                match tokio::time::timeout(processing_timeout, inner.search(&keyword_owned)).await
                {
                    Ok(Ok(results)) => {
                        cache.store(&name, &key_owned, results.clone(), true);
                        Ok(results)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(SearchError::Timeout),
                };
            // The caller may have stopped listening; the cache update above
            // is the part that must not be lost.
            let _ = tx.send(outcome);
        });

        match tokio::time::timeout(self.response_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Ok(Vec::new()),
            Err(_) => {
                debug!(
                    plugin = self.inner.name(),
                    "Response deadline hit, serving stale or empty"
                );
                Ok(self.cache.stale(self.inner.name(), key).unwrap_or_default())
            }
        }
    }
}

#[async_trait]
impl SearchSource for AsyncSearchSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn priority(&self) -> i32 {
        self.inner.priority()
    }

    async fn search(&self, keyword: &str) -> Result<Vec<SearchResult>, SearchError> {
        let key = keyword_digest(keyword);

        if let Some(hit) = self.cache.lookup(self.inner.name(), &key) {
            if hit.needs_refresh {
                self.spawn_refresh(keyword, &key);
            }
            return Ok(hit.results);
        }

        self.dual_channel_search(keyword, &key).await
    }
}
