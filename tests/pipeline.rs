//! End-to-end ingestion passes against in-process and file backends.

use std::collections::HashSet;
use std::sync::Arc;

use rss_aggregator::error::AppError;
use rss_aggregator::models::{CanonicalRecord, DegeneratePolicy, Feed, RawEntry};
use rss_aggregator::notify::{ChangeNotifier, EventLog, LocalEventLog, MemoryEventLog};
use rss_aggregator::pipeline::{IngestPipeline, PassStage, assign_id, normalize};
use rss_aggregator::services::FileFeedSource;
use rss_aggregator::storage::{LocalStore, MemoryStore, RecordStore};
use tempfile::TempDir;

const CHANNEL: &str = "rss:unprocessed";

fn entry(guid: &str, link: &str, pub_date: &str) -> RawEntry {
    RawEntry {
        title: format!("Story {}{}", guid, link),
        links: if link.is_empty() {
            Vec::new()
        } else {
            vec![link.to_string()]
        },
        description: "Body &amp; more".to_string(),
        pub_date: pub_date.to_string(),
        guid: guid.to_string(),
        categories: Vec::new(),
    }
}

fn feed(entries: Vec<RawEntry>) -> Feed {
    Feed {
        title: "BBC News".to_string(),
        description: "World".to_string(),
        entries,
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    log: Arc<MemoryEventLog>,
    pipeline: IngestPipeline,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(MemoryEventLog::new());
        let notifier = ChangeNotifier::new(log.clone(), CHANNEL);
        let pipeline = IngestPipeline::new(store.clone(), notifier);
        Self {
            store,
            log,
            pipeline,
        }
    }

    fn published(&self) -> Vec<String> {
        self.log.events(CHANNEL).into_iter().map(|e| e.id).collect()
    }
}

fn id_set<I, S>(ids: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(Into::into).collect()
}

#[tokio::test]
async fn two_entries_on_empty_store_notify_twice() {
    let harness = Harness::new();
    let input = feed(vec![
        entry("", "https://x/1", "2024-01-01"),
        entry("g1", "https://x/1", "2024-01-01"),
    ]);

    let summary = harness.pipeline.ingest_feed(&input).await.unwrap();

    let expected = id_set([
        "071864e31d91cce803dedabcc35355ad8cd5c3df",
        "12b7e93d0aec9c3e3ffd031d17e45b80e5368dd3",
    ]);
    assert_eq!(summary.inserted, expected);
    assert_eq!(summary.notified, 2);
    assert!(summary.notify_failures.is_empty());
    assert_eq!(id_set(harness.published()), expected);
}

#[tokio::test]
async fn second_pass_over_same_feed_inserts_nothing() {
    let harness = Harness::new();
    let input = feed(vec![entry("guid-7", "https://a", "2024-02-02")]);

    let first = harness.pipeline.ingest_feed(&input).await.unwrap();
    let second = harness.pipeline.ingest_feed(&input).await.unwrap();

    assert_eq!(
        first.inserted,
        id_set(["fc7dfb4466b123e08000f28d1eb3e832c2d3f086"])
    );
    assert!(second.inserted.is_empty());
    assert_eq!(second.updated, 1);
    assert_eq!(second.notified, 0);
    assert_eq!(harness.published().len(), 1);
    assert_eq!(harness.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn only_records_missing_before_the_pass_are_announced() {
    let harness = Harness::new();
    let entries: Vec<RawEntry> = (0..5)
        .map(|i| entry("", &format!("https://x/{}", i), "2024-03-03"))
        .collect();

    let existing: HashSet<String> = entries[..2]
        .iter()
        .map(|e| normalize(e, "BBC News").id)
        .collect();
    for e in &entries[..2] {
        harness.store.seed(normalize(e, "BBC News"));
    }

    let all: HashSet<String> = entries
        .iter()
        .map(|e| normalize(e, "BBC News").id)
        .collect();
    let summary = harness.pipeline.ingest_feed(&feed(entries)).await.unwrap();

    let expected: HashSet<String> = all.difference(&existing).cloned().collect();
    assert_eq!(summary.submitted, 5);
    assert_eq!(summary.notified, 3);
    assert_eq!(summary.inserted, expected);
    assert_eq!(id_set(harness.published()), expected);
}

#[tokio::test]
async fn empty_feed_touches_no_backend() {
    let harness = Harness::new();

    let summary = harness.pipeline.ingest_feed(&feed(Vec::new())).await.unwrap();

    assert_eq!(summary.normalized, 0);
    assert!(summary.inserted.is_empty());
    assert_eq!(harness.store.batch_calls(), 0);
    assert_eq!(harness.log.append_calls(), 0);
}

#[tokio::test]
async fn unavailable_store_fails_pass_without_notifications() {
    let harness = Harness::new();
    harness.store.set_unavailable(true);

    let err = harness
        .pipeline
        .ingest_feed(&feed(vec![entry("", "https://a", "2024-02-02")]))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(PassStage::Stored));
    assert!(matches!(err, AppError::Stage { .. }));
    assert_eq!(harness.log.append_calls(), 0);
}

#[tokio::test]
async fn failed_records_are_reported_and_not_announced() {
    let harness = Harness::new();
    let bad = assign_id("", "https://b", "2024-02-02");
    harness.store.fail_id(bad.clone());

    let summary = harness
        .pipeline
        .ingest_feed(&feed(vec![
            entry("", "https://a", "2024-02-02"),
            entry("", "https://b", "2024-02-02"),
        ]))
        .await
        .unwrap();

    assert!(summary.store_failures.contains_key(&bad));
    assert_eq!(
        summary.inserted,
        id_set(["d6322220191137c4051b70feb74923943ad439eb"])
    );
    assert_eq!(harness.published(), vec![
        "d6322220191137c4051b70feb74923943ad439eb".to_string()
    ]);
}

#[tokio::test]
async fn partial_notify_failure_still_succeeds() {
    let harness = Harness::new();
    let failing = "d0a2ad294e83782da29a665d67a7c5a11891731e";
    harness.log.fail_id(failing);

    let summary = harness
        .pipeline
        .ingest_feed(&feed(vec![
            entry("", "https://a", "2024-02-02"),
            entry("", "https://b", "2024-02-02"),
        ]))
        .await
        .unwrap();

    assert_eq!(summary.inserted.len(), 2);
    assert_eq!(summary.notified, 1);
    assert_eq!(summary.notify_failures.len(), 1);
    assert_eq!(summary.notify_failures[0].id, failing);
    assert!(harness.store.get(failing).await.unwrap().is_some());
}

#[tokio::test]
async fn rejected_degenerate_entries_are_not_stored() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryEventLog::new());
    let pipeline = IngestPipeline::new(store.clone(), ChangeNotifier::new(log.clone(), CHANNEL))
        .with_degenerate_policy(DegeneratePolicy::Reject);

    let summary = pipeline
        .ingest_feed(&feed(vec![
            entry("", "", "2024-02-02"),
            entry("", "https://a", "2024-02-02"),
        ]))
        .await
        .unwrap();

    assert_eq!(summary.normalized, 2);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.submitted, 1);
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(log.events(CHANNEL).len(), 1);
}

#[tokio::test]
async fn enrichment_survives_reingestion() {
    let harness = Harness::new();
    let input = feed(vec![entry("", "https://a", "2024-02-02")]);
    harness.pipeline.ingest_feed(&input).await.unwrap();

    let id = assign_id("", "https://a", "2024-02-02");
    let mut enriched: CanonicalRecord = harness.store.get(&id).await.unwrap().unwrap();
    enriched.geo_located = true;
    harness.store.seed(enriched);

    harness.pipeline.ingest_feed(&input).await.unwrap();
    let stored = harness.store.get(&id).await.unwrap().unwrap();
    assert!(stored.geo_located);
    assert_eq!(stored.description, "Body & more");
}

const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>BBC News</title>
    <description>World</description>
    <item>
      <title>First</title>
      <link>https://x/1</link>
      <pubDate>2024-01-01</pubDate>
    </item>
    <item>
      <title>Second</title>
      <link>https://x/1</link>
      <guid>g1</guid>
      <pubDate>2024-01-01</pubDate>
    </item>
  </channel>
</rss>"#;

#[tokio::test]
async fn file_feed_into_local_backends() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("world.xml"), RSS).unwrap();

    let store = Arc::new(LocalStore::new(tmp.path().join("records")));
    let events = Arc::new(LocalEventLog::new(tmp.path().join("streams")));
    let pipeline = IngestPipeline::new(store.clone(), ChangeNotifier::new(events.clone(), CHANNEL));
    let source = FileFeedSource::new(tmp.path());

    let first = pipeline.run_pass(&source, "world.xml").await.unwrap();
    assert_eq!(first.source, "BBC News");
    assert_eq!(first.inserted.len(), 2);
    assert_eq!(events.entry_count(CHANNEL).await.unwrap(), 2);

    let second = pipeline.run_pass(&source, "world.xml").await.unwrap();
    assert!(second.inserted.is_empty());
    assert_eq!(second.updated, 2);
    assert_eq!(events.entry_count(CHANNEL).await.unwrap(), 2);
    assert_eq!(store.count().await.unwrap(), 2);

    let stored = store
        .get("071864e31d91cce803dedabcc35355ad8cd5c3df")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "First");
    assert_eq!(stored.link, "https://x/1");
}

#[tokio::test]
async fn missing_feed_file_fails_in_fetch_stage() {
    let tmp = TempDir::new().unwrap();
    let harness = Harness::new();
    let source = FileFeedSource::new(tmp.path());

    let err = harness
        .pipeline
        .run_pass(&source, "absent.xml")
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(PassStage::Fetched));
    assert_eq!(harness.store.batch_calls(), 0);
    assert_eq!(harness.log.append_calls(), 0);
}
