//! Async-plugin subsystem.
//!
//! Wraps plugin sources in a cache-and-refresh decorator: callers get a
//! fast answer within a short deadline while the real fetch keeps running
//! in the background and lands in a per-plugin cache that is persisted
//! across restarts.

mod cache;
mod source;

pub use cache::{AsyncResultCache, CacheHit, CachedEntry};
pub use source::{AsyncSearchSource, WorkerBudget};
