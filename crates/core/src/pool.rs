//! Bounded-concurrency batch executor.
//!
//! Runs a batch of independent tasks with at most `concurrency` in flight
//! and one deadline over the whole batch. Results are returned in submission
//! order; a task that fails or straddles the deadline contributes `None`.

use futures::future::{join_all, BoxFuture};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// A unit of batch work. Tasks report failure by resolving to `None`.
pub type PoolTask<T> = BoxFuture<'static, Option<T>>;

pub async fn execute_batch<T: Send + 'static>(
    tasks: Vec<PoolTask<T>>,
    concurrency: usize,
    deadline: std::time::Duration,
) -> Vec<Option<T>> {
    if tasks.is_empty() {
        return Vec::new();
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let deadline_at = Instant::now() + deadline;

    let bounded = tasks.into_iter().map(|task| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let work = async move {
                // Held until the task resolves; waiting for it counts
                // against the batch deadline.
                let _permit = semaphore.acquire_owned().await.ok()?;
                task.await
            };
            match tokio::time::timeout_at(deadline_at, work).await {
                Ok(result) => result,
                Err(_) => None,
            }
        }
    });

    join_all(bounded).await
}
