use std::sync::Arc;

use pansou_core::{AsyncResultCache, Config, SearchService};

/// Shared application state
pub struct AppState {
    config: Config,
    service: Arc<SearchService>,
    async_cache: Option<Arc<AsyncResultCache>>,
}

impl AppState {
    pub fn new(
        config: Config,
        service: Arc<SearchService>,
        async_cache: Option<Arc<AsyncResultCache>>,
    ) -> Self {
        Self {
            config,
            service,
            async_cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the search orchestrator
    pub fn service(&self) -> &Arc<SearchService> {
        &self.service
    }

    /// Get the async plugin cache (if the subsystem is enabled)
    pub fn async_cache(&self) -> Option<&Arc<AsyncResultCache>> {
        self.async_cache.as_ref()
    }
}
