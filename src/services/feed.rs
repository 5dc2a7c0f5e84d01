//! Feed retrieval and RSS decoding.
//!
//! Decodes RSS 2.0 (`rss/channel/item`). Elements the pipeline does not use
//! are ignored, and missing ones decode to empty values.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Feed, FeedConfig, RawCategory, RawEntry};
use crate::utils::http;

/// Supplies decoded feeds.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Retrieve and decode the feed at `location`.
    async fn fetch(&self, location: &str) -> Result<Feed>;
}

/// Fetches feeds over HTTP.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            client: http::create_async_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, location: &str) -> Result<Feed> {
        log::debug!("GET {}", location);

        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| AppError::fetch(location, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(
                location,
                format!("unexpected status code: {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::fetch(location, format!("read body: {}", e)))?;

        decode_feed(&body).map_err(|e| AppError::decode(location, e))
    }
}

/// Reads feeds from RSS files on disk; `location` is relative to `base_dir`.
#[derive(Debug, Clone, Default)]
pub struct FileFeedSource {
    base_dir: PathBuf,
}

impl FileFeedSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl FeedSource for FileFeedSource {
    async fn fetch(&self, location: &str) -> Result<Feed> {
        let path = self.base_dir.join(location);
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AppError::fetch(location, e))?;
        decode_feed(&body).map_err(|e| AppError::decode(location, e))
    }
}

#[derive(Debug, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: String,
    #[serde(rename = "link", default)]
    links: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(rename = "pubDate", default)]
    pub_date: String,
    #[serde(default)]
    guid: Option<RssText>,
    #[serde(rename = "category", default)]
    categories: Vec<RssCategory>,
}

/// Element whose attributes are ignored.
#[derive(Debug, Deserialize)]
struct RssText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct RssCategory {
    #[serde(rename = "@domain", default)]
    domain: String,
    #[serde(rename = "$text", default)]
    value: String,
}

impl From<RssItem> for RawEntry {
    fn from(item: RssItem) -> Self {
        RawEntry {
            title: item.title,
            links: item.links,
            description: item.description,
            pub_date: item.pub_date,
            guid: item.guid.map(|g| g.value).unwrap_or_default(),
            categories: item
                .categories
                .into_iter()
                .map(|c| RawCategory::new(c.domain, c.value))
                .collect(),
        }
    }
}

/// Decode an RSS 2.0 document.
pub fn decode_feed(xml: &str) -> std::result::Result<Feed, quick_xml::DeError> {
    let document: RssDocument = quick_xml::de::from_str(xml)?;
    let channel = document.channel;

    Ok(Feed {
        title: channel.title,
        description: channel.description,
        entries: channel.items.into_iter().map(RawEntry::from).collect(),
    })
}
