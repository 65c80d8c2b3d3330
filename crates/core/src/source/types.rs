//! Types for the netdisk search system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Which view of the response the caller wants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    All,
    Results,
    #[default]
    #[serde(alias = "merge")]
    MergedByType,
}

impl ResultType {
    /// Parse the `res` request parameter. Unknown values fall back to the
    /// default view.
    pub fn from_param(s: &str) -> Self {
        match s.trim() {
            "all" => ResultType::All,
            "results" => ResultType::Results,
            "merge" | "merged_by_type" => ResultType::MergedByType,
            _ => ResultType::default(),
        }
    }
}

/// Which kinds of sources a request fans out to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    All,
    Tg,
    Plugin,
}

impl SourceType {
    /// Parse the `src` request parameter. Unknown values fall back to `all`.
    pub fn from_param(s: &str) -> Self {
        match s.trim() {
            "all" => SourceType::All,
            "tg" => SourceType::Tg,
            "plugin" => SourceType::Plugin,
            _ => SourceType::default(),
        }
    }
}

/// A search request after HTTP-layer decoding.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Free-text keyword (required).
    pub keyword: String,
    /// Telegram channels to search; empty means "use the configured set".
    pub channels: Vec<String>,
    /// Plugin names to search; empty means "all registered plugins".
    pub plugins: Vec<String>,
    /// Concurrency hint; 0 means "derive from the task count".
    pub concurrency: usize,
    /// Bypass the response cache and re-run all sources.
    pub force_refresh: bool,
    /// Response view selector.
    pub result_type: ResultType,
    /// Source kind selector.
    pub source_type: SourceType,
}

impl SearchRequest {
    /// Apply the request-level normalisation rules: trim the keyword, drop
    /// empty list entries, and enforce the source-type mutual exclusion
    /// (tg-only requests carry no plugins, plugin-only requests no channels).
    pub fn normalized(mut self) -> Self {
        self.keyword = self.keyword.trim().to_string();
        self.channels.retain(|c| !c.trim().is_empty());
        self.plugins.retain(|p| !p.trim().is_empty());

        match self.source_type {
            SourceType::Tg => self.plugins.clear(),
            SourceType::Plugin => self.channels.clear(),
            SourceType::All => {}
        }

        self
    }
}

/// Netdisk provider behind a link.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Baidu,
    Aliyun,
    Xunlei,
    Quark,
    Tianyi,
    #[serde(rename = "115")]
    Pan115,
    #[serde(rename = "123")]
    Pan123,
    Weiyun,
    Pikpak,
    Lanzou,
    Jianguoyun,
    Mobile,
    Chengtong,
    Ed2k,
    Magnet,
    Uc,
    Others,
}

impl LinkType {
    /// Map a provider's service identifier to a link type.
    ///
    /// Returns `None` for explicitly unknown services so callers drop the
    /// link instead of mislabelling it.
    pub fn from_service(service: &str) -> Option<LinkType> {
        match service.to_lowercase().as_str() {
            "baidu" => Some(LinkType::Baidu),
            "aliyun" => Some(LinkType::Aliyun),
            "xunlei" => Some(LinkType::Xunlei),
            "quark" => Some(LinkType::Quark),
            "189cloud" => Some(LinkType::Tianyi),
            "115" => Some(LinkType::Pan115),
            "123" => Some(LinkType::Pan123),
            "weiyun" => Some(LinkType::Weiyun),
            "pikpak" => Some(LinkType::Pikpak),
            "lanzou" => Some(LinkType::Lanzou),
            "jianguoyun" => Some(LinkType::Jianguoyun),
            "caiyun" => Some(LinkType::Mobile),
            "chengtong" => Some(LinkType::Chengtong),
            "ed2k" => Some(LinkType::Ed2k),
            "magnet" => Some(LinkType::Magnet),
            "unknown" => None,
            _ => Some(LinkType::Others),
        }
    }

    /// Classify a raw URL by its scheme or host.
    ///
    /// Returns `None` when the URL matches no known provider; such links are
    /// dropped before a result is emitted.
    pub fn from_url(url: &str) -> Option<LinkType> {
        let url = url.to_lowercase();
        if url.starts_with("ed2k://") {
            return Some(LinkType::Ed2k);
        }
        if url.starts_with("magnet:") {
            return Some(LinkType::Magnet);
        }

        const PATTERNS: [(&str, LinkType); 15] = [
            ("pan.baidu.com", LinkType::Baidu),
            ("aliyundrive.com", LinkType::Aliyun),
            ("alipan.com", LinkType::Aliyun),
            ("pan.xunlei.com", LinkType::Xunlei),
            ("pan.quark.cn", LinkType::Quark),
            ("cloud.189.cn", LinkType::Tianyi),
            ("115.com", LinkType::Pan115),
            ("123pan.com", LinkType::Pan123),
            ("share.weiyun.com", LinkType::Weiyun),
            ("mypikpak.com", LinkType::Pikpak),
            ("lanzou", LinkType::Lanzou),
            ("jianguoyun.com", LinkType::Jianguoyun),
            ("caiyun.139.com", LinkType::Mobile),
            ("ctfile.com", LinkType::Chengtong),
            ("drive.uc.cn", LinkType::Uc),
        ];

        PATTERNS
            .iter()
            .find(|(pattern, _)| url.contains(pattern))
            .map(|(_, link_type)| *link_type)
    }
}

/// A single netdisk link inside a search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub url: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,
    /// Extraction code, empty when the share is open.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

/// One item returned by a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Stable id per source+item, used for cross-refresh deduplication.
    pub unique_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    /// Publication time; `None` means the source did not report one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<Utc>>,
    /// Originating Telegram channel, empty for plugin results.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// The canonical per-URL record in the provider-grouped view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedLink {
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Title of the originating result.
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<Utc>>,
}

/// Provider type → newest-first links.
pub type MergedLinks = HashMap<LinkType, Vec<MergedLink>>;

/// The full search response; view projection reduces it to the shape the
/// caller asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_by_type: Option<MergedLinks>,
}

impl SearchResponse {
    /// An empty response in the full (`all`) shape.
    pub fn empty() -> Self {
        Self {
            total: 0,
            results: Some(Vec::new()),
            merged_by_type: Some(HashMap::new()),
        }
    }

    fn results_len(&self) -> usize {
        self.results.as_ref().map(Vec::len).unwrap_or(0)
    }

    fn merged_len(&self) -> usize {
        self.merged_by_type
            .as_ref()
            .map(|m| m.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Reduce a full response to the requested view.
    ///
    /// `results` keeps only the filtered result list; `merged_by_type` keeps
    /// only the provider grouping, with `total` switching to the number of
    /// merged links; `all` keeps everything.
    pub fn project(&self, view: ResultType) -> SearchResponse {
        match view {
            ResultType::Results => SearchResponse {
                total: self.results_len(),
                results: self.results.clone(),
                merged_by_type: None,
            },
            ResultType::MergedByType => SearchResponse {
                total: self.merged_len(),
                results: None,
                merged_by_type: self.merged_by_type.clone(),
            },
            ResultType::All => SearchResponse {
                total: self.results_len(),
                results: self.results.clone(),
                merged_by_type: self.merged_by_type.clone(),
            },
        }
    }
}

/// Errors that can occur during search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    #[error("source connection failed: {0}")]
    ConnectionFailed(String),

    #[error("source API error: {0}")]
    ApiError(String),

    #[error("failed to parse source response: {0}")]
    ParseError(String),

    #[error("request timeout")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}
