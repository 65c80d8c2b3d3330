//! Telegram channel scraper source.
//!
//! Searches a channel through its public HTML preview (`t.me/s/<channel>`)
//! and extracts netdisk links from the message blocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

use super::{Link, LinkType, SearchError, SearchResult, SearchSource};

const PREVIEW_BASE_URL: &str = "https://t.me/s";

/// A single Telegram channel exposed as a search source.
pub struct TelegramChannelSource {
    client: Client,
    channel: String,
}

impl TelegramChannelSource {
    /// Create a source for one channel with its own HTTP client.
    pub fn new(channel: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self::with_client(channel, client)
    }

    /// Create a source that shares an existing HTTP client.
    pub fn with_client(channel: &str, client: Client) -> Self {
        Self {
            client,
            channel: channel.to_string(),
        }
    }

    fn build_search_url(&self, keyword: &str) -> String {
        format!(
            "{}/{}?q={}",
            PREVIEW_BASE_URL,
            urlencoding::encode(&self.channel),
            urlencoding::encode(keyword)
        )
    }
}

#[async_trait]
impl SearchSource for TelegramChannelSource {
    fn name(&self) -> &str {
        &self.channel
    }

    async fn search(&self, keyword: &str) -> Result<Vec<SearchResult>, SearchError> {
        let url = self.build_search_url(keyword);
        debug!(channel = %self.channel, "Searching Telegram channel");

        let response = self.client.get(&url).send().await.map_err(|e| {
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
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        let results = parse_channel_messages(&html, &self.channel);
        debug!(
            channel = %self.channel,
            results = results.len(),
            "Telegram channel search complete"
        );
        Ok(results)
    }
}

/// Extract search results from a channel preview page.
///
/// Messages without at least one recognised netdisk link are skipped.
fn parse_channel_messages(html: &str, channel: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let message_sel =
        Selector::parse("div.tgme_widget_message").expect("static selector");
    let text_sel =
        Selector::parse("div.tgme_widget_message_text").expect("static selector");
    let link_sel = Selector::parse("a[href]").expect("static selector");
    let time_sel = Selector::parse("time[datetime]").expect("static selector");

    let mut results = Vec::new();

    for (index, message) in document.select(&message_sel).enumerate() {
        let mut links: Vec<Link> = Vec::new();
        for anchor in message.select(&link_sel) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(link_type) = LinkType::from_url(href) else {
                continue;
            };
            if links.iter().any(|l| l.url == href) {
                continue;
            }
            links.push(Link {
                url: href.to_string(),
                link_type,
                password: extract_password(href),
            });
        }
        if links.is_empty() {
            continue;
        }

        let text_parts: Vec<String> = message
            .select(&text_sel)
            .next()
            .map(|e| {
                e.text()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let title = text_parts.first().cloned().unwrap_or_default();
        let content = text_parts.join(" ");

        let datetime = message
            .select(&time_sel)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .and_then(parse_message_datetime);

        // "channel/12345" from the message wrapper, falling back to the
        // position on the page so ids stay unique within one fetch.
        let message_id = message
            .value()
            .attr("data-post")
            .and_then(|p| p.rsplit('/').next())
            .map(String::from)
            .unwrap_or_else(|| index.to_string());

        results.push(SearchResult {
            unique_id: format!("{}-{}", channel, message_id),
            title,
            content,
            datetime,
            channel: channel.to_string(),
            links,
        });
    }

    results
}

/// Parse the `datetime` attribute of a message's time tag.
fn parse_message_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Pull an extraction code out of a share URL's `pwd` query parameter.
fn extract_password(url: &str) -> String {
    url.split_once("pwd=")
        .map(|(_, rest)| {
            rest.chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect()
        })
        .unwrap_or_default()
}
