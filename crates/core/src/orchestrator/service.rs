//! Search orchestration: normalise the request, probe the cache, fan out
//! to the selected sources, postprocess, and write the response back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{CacheKeyBuilder, TwoLevelCache};
use crate::config::Config;
use crate::pipeline;
use crate::pool::{execute_batch, PoolTask};
use crate::source::{
    ResultType, SearchError, SearchRequest, SearchResponse, SearchResult, SearchSource,
    SourceRegistry, SourceType,
};

/// Extra headroom added to the task count when the caller gives no
/// concurrency hint.
const CONCURRENCY_HEADROOM: usize = 10;

/// The search orchestrator. Holds the plugin registry, the channel
/// adapters, and the response cache as explicit dependencies.
pub struct SearchService {
    registry: Arc<SourceRegistry>,
    channels: HashMap<String, Arc<dyn SearchSource>>,
    cache: Option<Arc<TwoLevelCache>>,
    keys: CacheKeyBuilder,
    default_channels: Vec<String>,
    cache_ttl: Duration,
    deadline: Duration,
}

impl SearchService {
    pub fn new(
        config: &Config,
        registry: Arc<SourceRegistry>,
        channels: Vec<Arc<dyn SearchSource>>,
        cache: Option<Arc<TwoLevelCache>>,
    ) -> Self {
        let keys = CacheKeyBuilder::new(registry.names());
        let channels = channels
            .into_iter()
            .map(|c| (c.name().to_string(), c))
            .collect();

        Self {
            registry,
            channels,
            cache,
            keys,
            default_channels: config.search.default_channels.clone(),
            cache_ttl: config.cache.ttl(),
            deadline: config.search.deadline(),
        }
    }

    /// Run one search end to end and return the projected view.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        let request = request.normalized();
        if request.keyword.is_empty() {
            return Err(SearchError::InvalidRequest(
                "keyword must not be empty".to_string(),
            ));
        }

        let fingerprint = self.keys.generate(
            &request.keyword,
            &request.channels,
            result_type_field(request.result_type),
            request.source_type,
            &request.plugins,
        );

        if !request.force_refresh {
            if let Some(full) = self.cache_probe(&fingerprint).await {
                debug!(keyword = %request.keyword, "Cache hit");
                return Ok(full.project(request.result_type));
            }
        }

        let sources = self.select_sources(&request);
        if sources.is_empty() {
            debug!(keyword = %request.keyword, "No sources selected");
            return Ok(SearchResponse::empty().project(request.result_type));
        }

        let concurrency = if request.concurrency > 0 {
            request.concurrency
        } else {
            sources.len() + CONCURRENCY_HEADROOM
        };

        debug!(
            keyword = %request.keyword,
            sources = sources.len(),
            concurrency,
            "Starting fan-out"
        );

        let tasks: Vec<PoolTask<Vec<SearchResult>>> = sources
            .into_iter()
            .map(|source| {
                let keyword = request.keyword.clone();
                Box::pin(async move {
                    match source.search(&keyword).await {
                        Ok(results) => Some(results),
                        Err(e) => {
                            warn!(source = source.name(), error = %e, "Source search failed");
                            None
                        }
                    }
                }) as PoolTask<Vec<SearchResult>>
            })
            .collect();

        let batches = execute_batch(tasks, concurrency, self.deadline).await;
        let raw: Vec<SearchResult> = batches.into_iter().flatten().flatten().collect();

        let response = pipeline::build_response(raw, &request.keyword);
        self.cache_write(fingerprint, &response);

        Ok(response.project(request.result_type))
    }

    /// Number of registered plugins, for health reporting.
    pub fn plugin_count(&self) -> usize {
        self.registry.len()
    }

    /// Names of the configured channel adapters.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    async fn cache_probe(&self, fingerprint: &str) -> Option<SearchResponse> {
        let cache = self.cache.as_ref()?;
        let bytes = cache.get(fingerprint).await?;
        match serde_json::from_slice(&bytes) {
            Ok(full) => Some(full),
            Err(e) => {
                warn!(error = %e, "Failed to decode cached response, treating as miss");
                None
            }
        }
    }

    /// Serialise and store the full response without blocking the caller.
    fn cache_write(&self, fingerprint: String, response: &SearchResponse) {
        let Some(cache) = &self.cache else {
            return;
        };
        let bytes = match serde_json::to_vec(response) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialise response for caching");
                return;
            }
        };

        let cache = Arc::clone(cache);
        let ttl = self.cache_ttl;
        tokio::spawn(async move {
            cache.set(&fingerprint, bytes, ttl).await;
        });
    }

    /// Enumerate the sources this request fans out to.
    fn select_sources(&self, request: &SearchRequest) -> Vec<Arc<dyn SearchSource>> {
        let mut sources: Vec<Arc<dyn SearchSource>> = Vec::new();

        if matches!(request.source_type, SourceType::All | SourceType::Tg) {
            let names = if request.channels.is_empty() {
                &self.default_channels
            } else {
                &request.channels
            };
            for name in names {
                match self.channels.get(name) {
                    Some(channel) => sources.push(Arc::clone(channel)),
                    None => debug!(channel = %name, "Requested channel not configured, skipping"),
                }
            }
        }

        if matches!(request.source_type, SourceType::All | SourceType::Plugin) {
            let mut wanted: Vec<&str> = request.plugins.iter().map(String::as_str).collect();
            wanted.sort_unstable();
            wanted.dedup();

            let all_names = self.registry.names();
            let is_full_set = !all_names.is_empty()
                && wanted == all_names.iter().map(String::as_str).collect::<Vec<_>>();

            if wanted.is_empty() || is_full_set {
                sources.extend(self.registry.all());
            } else {
                for name in wanted {
                    match self.registry.get(name) {
                        Some(plugin) => sources.push(Arc::clone(plugin)),
                        None => debug!(plugin = %name, "Requested plugin not registered, skipping"),
                    }
                }
            }
        }

        sources
    }
}

/// The result-type field fed into the fingerprint.
fn result_type_field(result_type: ResultType) -> &'static str {
    match result_type {
        ResultType::All => "all",
        ResultType::Results => "results",
        ResultType::MergedByType => "merged_by_type",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DiskCache, MemoryCache};
    use crate::source::{Link, LinkType};
    use crate::testing::MockSource;
    use chrono::Utc;
    use tempfile::TempDir;

    fn result_with_link(id: &str, title: &str, url: &str) -> SearchResult {
        SearchResult {
            unique_id: id.to_string(),
            title: title.to_string(),
            content: String::new(),
            datetime: Some(Utc::now()),
            channel: String::new(),
            links: vec![Link {
                url: url.to_string(),
                link_type: LinkType::Baidu,
                password: String::new(),
            }],
        }
    }

    fn registry_with(sources: Vec<Arc<dyn SearchSource>>) -> Arc<SourceRegistry> {
        let mut registry = SourceRegistry::new();
        for source in sources {
            registry.register(source);
        }
        Arc::new(registry)
    }

    fn service(
        registry: Arc<SourceRegistry>,
        channels: Vec<Arc<dyn SearchSource>>,
        cache: Option<Arc<TwoLevelCache>>,
    ) -> SearchService {
        let mut config = Config::default();
        config.search.default_channels =
            channels.iter().map(|c| c.name().to_string()).collect();
        config.search.plugin_timeout_secs = 5;
        SearchService::new(&config, registry, channels, cache)
    }

    fn request(keyword: &str) -> SearchRequest {
        SearchRequest {
            keyword: keyword.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_keyword_rejected() {
        let svc = service(registry_with(vec![]), vec![], None);
        let err = svc.search(request("   ")).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_fans_out_to_channels_and_plugins() {
        let channel = Arc::new(MockSource::new("chan").with_results(vec![result_with_link(
            "c1",
            "movie from channel",
            "https://pan.baidu.com/s/1",
        )]));
        let plugin = Arc::new(MockSource::new("plug").with_results(vec![result_with_link(
            "p1",
            "movie from plugin",
            "https://pan.baidu.com/s/2",
        )]));

        let svc = service(
            registry_with(vec![Arc::clone(&plugin) as Arc<dyn SearchSource>]),
            vec![Arc::clone(&channel) as Arc<dyn SearchSource>],
            None,
        );

        let response = svc
            .search(SearchRequest {
                keyword: "movie".to_string(),
                result_type: ResultType::All,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(channel.call_count(), 1);
        assert_eq!(plugin.call_count(), 1);
        assert_eq!(response.total, 2);
    }

    #[tokio::test]
    async fn test_tg_source_skips_plugins() {
        let channel = Arc::new(MockSource::new("chan"));
        let plugin = Arc::new(MockSource::new("plug"));

        let svc = service(
            registry_with(vec![Arc::clone(&plugin) as Arc<dyn SearchSource>]),
            vec![Arc::clone(&channel) as Arc<dyn SearchSource>],
            None,
        );

        svc.search(SearchRequest {
            keyword: "movie".to_string(),
            source_type: SourceType::Tg,
            plugins: vec!["plug".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(channel.call_count(), 1);
        assert_eq!(plugin.call_count(), 0);
    }

    #[tokio::test]
    async fn test_plugin_source_skips_channels() {
        let channel = Arc::new(MockSource::new("chan"));
        let plugin = Arc::new(MockSource::new("plug"));

        let svc = service(
            registry_with(vec![Arc::clone(&plugin) as Arc<dyn SearchSource>]),
            vec![Arc::clone(&channel) as Arc<dyn SearchSource>],
            None,
        );

        svc.search(SearchRequest {
            keyword: "movie".to_string(),
            source_type: SourceType::Plugin,
            channels: vec!["chan".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(channel.call_count(), 0);
        assert_eq!(plugin.call_count(), 1);
    }

    #[tokio::test]
    async fn test_explicit_full_plugin_set_runs_all() {
        let plugin_a = Arc::new(MockSource::new("aa"));
        let plugin_b = Arc::new(MockSource::new("bb"));

        let svc = service(
            registry_with(vec![
                Arc::clone(&plugin_a) as Arc<dyn SearchSource>,
                Arc::clone(&plugin_b) as Arc<dyn SearchSource>,
            ]),
            vec![],
            None,
        );

        svc.search(SearchRequest {
            keyword: "movie".to_string(),
            source_type: SourceType::Plugin,
            plugins: vec!["bb".to_string(), "aa".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(plugin_a.call_count(), 1);
        assert_eq!(plugin_b.call_count(), 1);
    }

    #[tokio::test]
    async fn test_subset_of_plugins_runs_only_those() {
        let plugin_a = Arc::new(MockSource::new("aa"));
        let plugin_b = Arc::new(MockSource::new("bb"));

        let svc = service(
            registry_with(vec![
                Arc::clone(&plugin_a) as Arc<dyn SearchSource>,
                Arc::clone(&plugin_b) as Arc<dyn SearchSource>,
            ]),
            vec![],
            None,
        );

        svc.search(SearchRequest {
            keyword: "movie".to_string(),
            source_type: SourceType::Plugin,
            plugins: vec!["aa".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(plugin_a.call_count(), 1);
        assert_eq!(plugin_b.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_sources_yields_empty_response() {
        let svc = service(registry_with(vec![]), vec![], None);
        let response = svc.search(request("movie")).await.unwrap();
        assert_eq!(response.total, 0);
    }

    #[tokio::test]
    async fn test_failing_source_is_non_fatal() {
        let good = Arc::new(MockSource::new("good").with_results(vec![result_with_link(
            "g1",
            "movie ok",
            "https://pan.baidu.com/s/1",
        )]));
        let bad = Arc::new(MockSource::new("bad").with_failure());

        let svc = service(
            registry_with(vec![
                Arc::clone(&good) as Arc<dyn SearchSource>,
                Arc::clone(&bad) as Arc<dyn SearchSource>,
            ]),
            vec![],
            None,
        );

        let response = svc
            .search(SearchRequest {
                keyword: "movie".to_string(),
                result_type: ResultType::Results,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.total, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_sources() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(TwoLevelCache::new(
            MemoryCache::new(1 << 20),
            DiskCache::new(dir.path()).unwrap(),
        ));
        let plugin = Arc::new(MockSource::new("plug").with_results(vec![result_with_link(
            "p1",
            "movie",
            "https://pan.baidu.com/s/1",
        )]));

        let svc = service(
            registry_with(vec![Arc::clone(&plugin) as Arc<dyn SearchSource>]),
            vec![],
            Some(cache),
        );

        let first = svc.search(request("movie")).await.unwrap();
        assert_eq!(plugin.call_count(), 1);

        // Give the async cache write a moment to land in the memory tier
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if svc.cache_probe_ready("movie").await {
                break;
            }
        }

        let second = svc.search(request("movie")).await.unwrap();
        assert_eq!(plugin.call_count(), 1);
        assert_eq!(second.total, first.total);
    }

    #[tokio::test]
    async fn test_force_refresh_reruns_sources() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(TwoLevelCache::new(
            MemoryCache::new(1 << 20),
            DiskCache::new(dir.path()).unwrap(),
        ));
        let plugin = Arc::new(MockSource::new("plug"));

        let svc = service(
            registry_with(vec![Arc::clone(&plugin) as Arc<dyn SearchSource>]),
            vec![],
            Some(cache),
        );

        svc.search(request("movie")).await.unwrap();
        svc.search(SearchRequest {
            keyword: "movie".to_string(),
            force_refresh: true,
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(plugin.call_count(), 2);
    }

    impl SearchService {
        /// Test helper: whether the write-back for this keyword landed.
        async fn cache_probe_ready(&self, keyword: &str) -> bool {
            let fingerprint = self.keys.generate(
                keyword,
                &[],
                result_type_field(ResultType::default()),
                SourceType::All,
                &[],
            );
            self.cache_probe(&fingerprint).await.is_some()
        }
    }
}
