//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Feed location and HTTP behavior
    #[serde(default)]
    pub feed: FeedConfig,

    /// Pass deadline and fan-out
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Record store backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Event log backend
    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    ///
    /// A file that exists but cannot be read or parsed is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.feed.url.trim().is_empty() {
            return Err(AppError::validation("feed.url is empty"));
        }
        // Anything that is not a URL is read as a file path.
        match url::Url::parse(&self.feed.url) {
            Ok(url) if !matches!(url.scheme(), "http" | "https") => {
                return Err(AppError::validation(format!(
                    "feed.url scheme '{}' is not supported; use http(s) or a file path",
                    url.scheme()
                )));
            }
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {}
            Err(e) => return Err(e.into()),
        }
        if self.feed.user_agent.trim().is_empty() {
            return Err(AppError::validation("feed.user_agent is empty"));
        }
        if self.feed.timeout_secs == 0 {
            return Err(AppError::validation("feed.timeout_secs must be > 0"));
        }
        if self.pipeline.pass_timeout_secs == 0 {
            return Err(AppError::validation(
                "pipeline.pass_timeout_secs must be > 0",
            ));
        }
        if self.pipeline.max_concurrent == 0 {
            return Err(AppError::validation("pipeline.max_concurrent must be > 0"));
        }
        if self.storage.backend == StorageBackend::Mongo
            && self.storage.mongodb_uri.trim().is_empty()
        {
            return Err(AppError::validation(
                "storage.mongodb_uri is required for the mongo backend",
            ));
        }
        if self.events.backend == EventBackend::Redis && self.events.redis_url.trim().is_empty() {
            return Err(AppError::validation(
                "events.redis_url is required for the redis backend",
            ));
        }
        if self.events.channel.trim().is_empty() {
            return Err(AppError::validation("events.channel is empty"));
        }
        Ok(())
    }
}

/// Feed source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Feed URL to ingest
    #[serde(default = "defaults::feed_url")]
    pub url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: defaults::feed_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// What to do with entries that have neither a guid nor a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Hash them anyway (id derived from the publication date alone)
    #[default]
    Accept,
    /// Drop them from the pass
    Reject,
}

/// Ingestion pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deadline for fetch + store + notify, in seconds
    #[serde(default = "defaults::pass_timeout")]
    pub pass_timeout_secs: u64,

    /// Maximum concurrent backend operations per stage
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default)]
    pub degenerate_ids: DegeneratePolicy,
}

impl PipelineConfig {
    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pass_timeout_secs: defaults::pass_timeout(),
            max_concurrent: defaults::max_concurrent(),
            degenerate_ids: DegeneratePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Mongo,
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory for the local backend
    #[serde(default = "defaults::records_dir")]
    pub root_dir: PathBuf,

    #[serde(default)]
    pub mongodb_uri: String,

    #[serde(default = "defaults::database")]
    pub database: String,

    #[serde(default = "defaults::collection")]
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root_dir: defaults::records_dir(),
            mongodb_uri: String::new(),
            database: defaults::database(),
            collection: defaults::collection(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventBackend {
    #[default]
    Local,
    Redis,
}

/// Event log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default)]
    pub backend: EventBackend,

    /// Logical channel new-record events are appended to
    #[serde(default = "defaults::channel")]
    pub channel: String,

    /// Directory for the local backend
    #[serde(default = "defaults::streams_dir")]
    pub root_dir: PathBuf,

    #[serde(default)]
    pub redis_url: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            backend: EventBackend::default(),
            channel: defaults::channel(),
            root_dir: defaults::streams_dir(),
            redis_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Feed defaults
    pub fn feed_url() -> String {
        "https://feeds.bbci.co.uk/news/world/rss.xml".into()
    }
    pub fn user_agent() -> String {
        "rss-aggregator/0.1".into()
    }
    pub fn timeout() -> u64 {
        10
    }

    // Pipeline defaults
    pub fn pass_timeout() -> u64 {
        10
    }
    pub fn max_concurrent() -> usize {
        8
    }

    // Backend defaults
    pub fn records_dir() -> PathBuf {
        PathBuf::from("data/records")
    }
    pub fn database() -> String {
        "mts".into()
    }
    pub fn collection() -> String {
        "feed_items".into()
    }
    pub fn channel() -> String {
        "rss:unprocessed".into()
    }
    pub fn streams_dir() -> PathBuf {
        PathBuf::from("data/streams")
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.pipeline.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_feed_file_paths() {
        let mut config = Config::default();
        config.feed.url = "feeds/world.xml".into();
        assert!(config.validate().is_ok());
        config.feed.url = "/var/lib/feeds/world.xml".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_feed_urls() {
        let mut config = Config::default();
        config.feed.url = "ftp://example.com/rss.xml".into();
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
        config.feed.url = "http://[::1".into();
        assert!(matches!(config.validate(), Err(AppError::Url(_))));
    }

    #[test]
    fn validate_requires_connection_strings() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Mongo;
        assert!(config.validate().is_err());
        config.storage.mongodb_uri = "mongodb://localhost:27017".into();
        assert!(config.validate().is_ok());

        config.events.backend = EventBackend::Redis;
        assert!(config.validate().is_err());
        config.events.redis_url = "redis://localhost:6379".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [feed]
            url = "https://example.com/rss.xml"

            [pipeline]
            degenerate_ids = "reject"

            [events]
            backend = "redis"
            redis_url = "redis://localhost:6379"
            "#,
        )
        .unwrap();

        assert_eq!(config.feed.url, "https://example.com/rss.xml");
        assert_eq!(config.feed.timeout_secs, 10);
        assert_eq!(config.pipeline.degenerate_ids, DegeneratePolicy::Reject);
        assert_eq!(config.events.backend, EventBackend::Redis);
        assert_eq!(config.events.channel, "rss:unprocessed");
        assert_eq!(config.storage.backend, StorageBackend::Local);
    }

    #[test]
    fn load_or_default_falls_back_when_missing() {
        let config = Config::load_or_default("/nonexistent/config.toml").unwrap();
        assert_eq!(config.storage.collection, "feed_items");
    }

    #[test]
    fn load_or_default_rejects_broken_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[feed\nurl = 1").unwrap();
        assert!(matches!(Config::load_or_default(&path), Err(AppError::Toml(_))));

        fs::write(&path, "[feed]\nurl = \"feeds/world.xml\"\n").unwrap();
        assert_eq!(
            Config::load_or_default(&path).unwrap().feed.url,
            "feeds/world.xml"
        );
    }
}
