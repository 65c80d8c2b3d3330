pub mod asyncplugin;
pub mod cache;
pub mod config;
pub mod orchestrator;
pub mod pipeline;
pub mod pool;
pub mod source;
pub mod testing;

pub use asyncplugin::{AsyncResultCache, AsyncSearchSource, WorkerBudget};
pub use cache::{CacheError, CacheKeyBuilder, DiskCache, MemoryCache, TwoLevelCache};
pub use config::{
    load_config, load_config_from_str, validate_config, AsyncPluginConfig, CacheConfig, Config,
    ConfigError, SearchConfig, ServerConfig,
};
pub use orchestrator::SearchService;
pub use source::{
    JikepanPlugin, Link, LinkType, MergedLink, MergedLinks, ResultType, SearchError,
    SearchRequest, SearchResponse, SearchResult, SearchSource, SourceRegistry, SourceType,
    TelegramChannelSource,
};
