//! New-record announcements on an append-only event log.
//!
//! The [`ChangeNotifier`] appends one [`NewRecordEvent`] per newly inserted
//! id to a single logical channel. Appends are independent and best effort:
//! a failed id is reported back to the caller and the rest still go out.

pub mod local;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_stream;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{EventBackend, EventsConfig, NewRecordEvent};

// Re-export for convenience
pub use local::LocalEventLog;
pub use memory::MemoryEventLog;
#[cfg(feature = "redis")]
pub use redis_stream::RedisEventLog;

/// Trait for event log backends.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one event to a channel, returning the log's entry id.
    async fn append(&self, channel: &str, event: &NewRecordEvent) -> Result<String>;

    /// Number of entries in a channel.
    async fn entry_count(&self, channel: &str) -> Result<usize>;
}

/// An id that could not be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyFailure {
    pub id: String,
    pub message: String,
}

/// Result of publishing a set of ids.
#[derive(Debug, Clone, Default)]
pub struct NotifyReport {
    /// Ids appended to the log
    pub published: HashSet<String>,
    /// Ids that still need publishing
    pub failed: Vec<NotifyFailure>,
}

impl NotifyReport {
    pub fn all_published(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Publishes new-record events to one channel of an event log.
#[derive(Clone)]
pub struct ChangeNotifier {
    log: Arc<dyn EventLog>,
    channel: String,
    max_concurrent: usize,
}

impl ChangeNotifier {
    pub fn new(log: Arc<dyn EventLog>, channel: impl Into<String>) -> Self {
        Self {
            log,
            channel: channel.into(),
            max_concurrent: 8,
        }
    }

    /// Limit how many appends are in flight at once.
    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish one event per id. Never fails as a whole.
    pub async fn publish_new<'a, I>(&self, ids: I) -> NotifyReport
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.publish_each(ids, |_| {}).await
    }

    /// Like [`publish_new`](Self::publish_new), calling `on_published` as
    /// soon as each append succeeds.
    pub async fn publish_each<'a, I, F>(&self, ids: I, mut on_published: F) -> NotifyReport
    where
        I: IntoIterator<Item = &'a String>,
        F: FnMut(&str),
    {
        let mut report = NotifyReport::default();

        let jobs: Vec<_> = ids.into_iter().map(|id| self.publish_one(id)).collect();
        let mut results = stream::iter(jobs).buffer_unordered(self.max_concurrent);

        while let Some((id, result)) = results.next().await {
            match result {
                Ok(entry_id) => {
                    log::debug!("Published {} to {} as {}", id, self.channel, entry_id);
                    on_published(id);
                    report.published.insert(id.to_string());
                }
                Err(e) => {
                    log::warn!("{}", e);
                    report.failed.push(NotifyFailure {
                        id: id.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }

    async fn publish_one<'a>(&self, id: &'a str) -> (&'a str, Result<String>) {
        let event = NewRecordEvent::new(id);
        let result = self
            .log
            .append(&self.channel, &event)
            .await
            .map_err(|e| AppError::notify(id, self.channel.as_str(), e));
        (id, result)
    }
}

/// Build the configured event log backend.
pub async fn open(config: &EventsConfig) -> Result<Arc<dyn EventLog>> {
    match config.backend {
        EventBackend::Local => Ok(Arc::new(LocalEventLog::new(&config.root_dir))),
        #[cfg(feature = "redis")]
        EventBackend::Redis => Ok(Arc::new(RedisEventLog::connect(&config.redis_url).await?)),
        #[cfg(not(feature = "redis"))]
        EventBackend::Redis => Err(AppError::config(
            "event backend 'redis' requires the `redis` feature",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_publishes_one_event_per_id() {
        let log = Arc::new(MemoryEventLog::new());
        let notifier = ChangeNotifier::new(log.clone(), "rss:unprocessed");

        let report = notifier.publish_new(&ids(&["a", "b", "c"])).await;
        assert!(report.all_published());
        assert_eq!(report.published, ids(&["a", "b", "c"]));

        let published: HashSet<String> = log
            .events("rss:unprocessed")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(published, ids(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_failures_do_not_block_others() {
        let log = Arc::new(MemoryEventLog::new());
        log.fail_id("b");
        let notifier = ChangeNotifier::new(log.clone(), "rss:unprocessed").with_concurrency(1);

        let report = notifier.publish_new(&ids(&["a", "b", "c"])).await;
        assert_eq!(report.published, ids(&["a", "c"]));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "b");
        assert_eq!(log.entry_count("rss:unprocessed").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_publish_each_reports_successes_only() {
        let log = Arc::new(MemoryEventLog::new());
        log.fail_id("b");
        let notifier = ChangeNotifier::new(log.clone(), "rss:unprocessed");

        let mut seen = HashSet::new();
        let report = notifier
            .publish_each(&ids(&["a", "b"]), |id| {
                seen.insert(id.to_string());
            })
            .await;

        assert_eq!(seen, ids(&["a"]));
        assert_eq!(report.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_set_publishes_nothing() {
        let log = Arc::new(MemoryEventLog::new());
        let notifier = ChangeNotifier::new(log.clone(), "rss:unprocessed");

        let report = notifier.publish_new(&HashSet::new()).await;
        assert!(report.published.is_empty());
        assert!(report.all_published());
        assert_eq!(log.append_calls(), 0);
    }
}
