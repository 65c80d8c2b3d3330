//! Search source abstraction.
//!
//! This module provides a `SearchSource` trait implemented both by Telegram
//! channel scrapers and by plugin adapters, plus the registry the
//! orchestrator fans out over.

mod jikepan;
mod registry;
mod telegram;
mod types;

use async_trait::async_trait;

pub use jikepan::JikepanPlugin;
pub use registry::SourceRegistry;
pub use telegram::TelegramChannelSource;
pub use types::*;

/// Trait for search sources (channel scrapers and plugin adapters).
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Source name for logging and request filtering.
    fn name(&self) -> &str;

    /// Tie-breaker hook: higher is preferred.
    fn priority(&self) -> i32 {
        0
    }

    /// Execute a search for the keyword.
    async fn search(&self, keyword: &str) -> Result<Vec<SearchResult>, SearchError>;
}
