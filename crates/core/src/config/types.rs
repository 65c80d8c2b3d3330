use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub async_plugin: AsyncPluginConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8888
}

/// Two-level response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Enable/disable the response cache entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Total byte budget for the in-memory tier (default: 100 MiB).
    #[serde(default = "default_memory_max_bytes")]
    pub memory_max_bytes: usize,

    /// TTL for cached responses, in minutes.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,

    /// Directory for the disk tier and the async-plugin persistence blob.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_max_bytes: default_memory_max_bytes(),
            ttl_minutes: default_ttl_minutes(),
            dir: default_cache_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_memory_max_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_ttl_minutes() -> u64 {
    60
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

impl CacheConfig {
    /// TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }
}

/// Search fan-out configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Channels searched when a request does not name any.
    #[serde(default = "default_channels")]
    pub default_channels: Vec<String>,

    /// Overall deadline for one fan-out batch, in seconds.
    #[serde(default = "default_plugin_timeout")]
    pub plugin_timeout_secs: u64,

    /// Per-request HTTP timeout for source adapters, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_channels: default_channels(),
            plugin_timeout_secs: default_plugin_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_channels() -> Vec<String> {
    vec!["tgsearchers2".to_string()]
}

fn default_plugin_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

impl SearchConfig {
    /// Batch deadline as a `Duration`.
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.plugin_timeout_secs)
    }

    /// Adapter HTTP timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Async-plugin subsystem configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AsyncPluginConfig {
    /// Enable the cache-and-refresh wrapper around plugin sources.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How long a caller waits for a first answer before falling back to
    /// stale or empty results, in seconds.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,

    /// Deadline for the background fetch itself, in seconds.
    #[serde(default = "default_processing_timeout")]
    pub processing_timeout_secs: u64,

    /// Maximum background fetches running at once.
    #[serde(default = "default_max_workers")]
    pub max_background_workers: usize,

    /// Hard ceiling on background fetches admitted but not yet finished.
    #[serde(default = "default_max_tasks")]
    pub max_background_tasks: usize,

    /// TTL for per-plugin cached results, in hours.
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    /// Soft ceiling on cached entries before scored eviction kicks in.
    #[serde(default = "default_max_entries")]
    pub max_cache_entries: usize,

    /// Interval between persistence snapshots, in seconds.
    #[serde(default = "default_persist_interval")]
    pub persist_interval_secs: u64,
}

impl Default for AsyncPluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            response_timeout_secs: default_response_timeout(),
            processing_timeout_secs: default_processing_timeout(),
            max_background_workers: default_max_workers(),
            max_background_tasks: default_max_tasks(),
            cache_ttl_hours: default_cache_ttl_hours(),
            max_cache_entries: default_max_entries(),
            persist_interval_secs: default_persist_interval(),
        }
    }
}

fn default_response_timeout() -> u64 {
    2
}

fn default_processing_timeout() -> u64 {
    30
}

fn default_max_workers() -> usize {
    20
}

fn default_max_tasks() -> usize {
    100
}

fn default_cache_ttl_hours() -> u64 {
    1
}

fn default_max_entries() -> usize {
    1000
}

fn default_persist_interval() -> u64 {
    120
}

impl AsyncPluginConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours * 3600)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs)
    }
}
