//! Jikepan API plugin source.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Link, LinkType, SearchError, SearchResult, SearchSource};

const JIKEPAN_API_URL: &str = "https://api.jikepan.xyz/search";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Jikepan netdisk search plugin.
pub struct JikepanPlugin {
    client: Client,
}

impl JikepanPlugin {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    fn convert_results(&self, items: Vec<JikepanItem>) -> Vec<SearchResult> {
        let mut results = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let mut links = Vec::with_capacity(item.links.len());
            for link in item.links {
                let Some(mut link_type) = LinkType::from_service(&link.service) else {
                    continue;
                };
                // The API labels some UC shares as generic "other"
                if link_type == LinkType::Others
                    && link.link.to_lowercase().contains("drive.uc.cn")
                {
                    link_type = LinkType::Uc;
                }
                links.push(Link {
                    url: link.link,
                    link_type,
                    password: link.pwd.unwrap_or_default(),
                });
            }
            if links.is_empty() {
                continue;
            }

            results.push(SearchResult {
                unique_id: format!("jikepan-{}", index),
                title: item.name,
                content: String::new(),
                datetime: None,
                channel: String::new(),
                links,
            });
        }

        results
    }
}

#[async_trait]
impl SearchSource for JikepanPlugin {
    fn name(&self) -> &str {
        "jikepan"
    }

    fn priority(&self) -> i32 {
        3
    }

    async fn search(&self, keyword: &str) -> Result<Vec<SearchResult>, SearchError> {
        let body = JikepanRequest {
            name: keyword.to_string(),
            is_all: false,
        };

        let response = self
            .client
            .post(JIKEPAN_API_URL)
            .header("referer", "https://jikepan.xyz/")
            .header("User-Agent", USER_AGENT)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else if e.is_connect() {
                    SearchError::ConnectionFailed(e.to_string())
                } else {
                    SearchError::ApiError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(SearchError::ApiError(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let api_response: JikepanResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        if api_response.msg != "success" {
            return Err(SearchError::ApiError(api_response.msg));
        }

        let results = self.convert_results(api_response.list);
        debug!(results = results.len(), "Jikepan search complete");
        Ok(results)
    }
}

#[derive(Debug, Serialize)]
struct JikepanRequest {
    name: String,
    is_all: bool,
}

#[derive(Debug, Deserialize)]
struct JikepanResponse {
    msg: String,
    #[serde(default)]
    list: Vec<JikepanItem>,
}

#[derive(Debug, Deserialize)]
struct JikepanItem {
    name: String,
    #[serde(default)]
    links: Vec<JikepanLink>,
}

#[derive(Debug, Deserialize)]
struct JikepanLink {
    service: String,
    link: String,
    #[serde(default)]
    pwd: Option<String>,
}
