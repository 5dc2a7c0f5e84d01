//! One ingestion pass: fetch, normalize, store, notify.
//!
//! ```text
//! Fetched ──► Normalized ──► Stored ──► Notified ──► Done
//!   │             │            │           │
//!   │ fatal       │ no errors  │ fatal     │ per-id failures collected
//! ```
//!
//! The whole pass runs under one deadline. A fetch or store failure ends the
//! pass with an error and nothing is published; notify failures end it
//! successfully with the unpublished ids listed in the summary. When the
//! deadline or a dropped store connection cuts a pass short, the error
//! carries the ids that may be new but were never announced
//! ([`AppError::pending`]).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{CanonicalRecord, DegeneratePolicy, Feed, PipelineConfig};
use crate::notify::{ChangeNotifier, NotifyFailure};
use crate::services::FeedSource;
use crate::storage::RecordStore;

use super::identity::is_degenerate;
use super::normalize::normalize;

/// States of a pass. While a stage is running, the pass is working toward it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStage {
    Fetched,
    Normalized,
    Stored,
    Notified,
    Done,
}

impl fmt::Display for PassStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetched => "fetch",
            Self::Normalized => "normalize",
            Self::Stored => "store",
            Self::Notified => "notify",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a successful pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    /// Feed title the records were tagged with
    pub source: String,
    /// Entries mapped to canonical records
    pub normalized: usize,
    /// Entries dropped by the degenerate-id policy
    pub rejected: usize,
    /// Records sent to the store after collapsing duplicate ids
    pub submitted: usize,
    /// Ids that did not exist before this pass
    pub inserted: HashSet<String>,
    pub updated: usize,
    pub store_failures: HashMap<String, String>,
    pub notified: usize,
    /// Ids that were stored but not announced
    pub notify_failures: Vec<NotifyFailure>,
}

impl PassSummary {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    /// Write the summary to the log.
    pub fn log(&self) {
        log::info!(
            "Pass complete for '{}': normalized={} rejected={} submitted={} inserted={} updated={} store_failures={} notified={} notify_failures={}",
            self.source,
            self.normalized,
            self.rejected,
            self.submitted,
            self.inserted.len(),
            self.updated,
            self.store_failures.len(),
            self.notified,
            self.notify_failures.len()
        );
        for failure in &self.notify_failures {
            log::warn!("Not announced: {} ({})", failure.id, failure.message);
        }
    }
}

/// Records ready for the store.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<CanonicalRecord>,
    /// Entries mapped before rejection and de-duplication
    pub normalized: usize,
    pub rejected: usize,
}

/// Sequences one pass over injected store and notifier.
#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn RecordStore>,
    notifier: ChangeNotifier,
    deadline: Duration,
    degenerate: DegeneratePolicy,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn RecordStore>, notifier: ChangeNotifier) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            store,
            notifier,
            deadline: defaults.pass_timeout(),
            degenerate: defaults.degenerate_ids,
        }
    }

    pub fn from_config(
        config: &PipelineConfig,
        store: Arc<dyn RecordStore>,
        notifier: ChangeNotifier,
    ) -> Self {
        Self::new(store, notifier)
            .with_deadline(config.pass_timeout())
            .with_degenerate_policy(config.degenerate_ids)
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_degenerate_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.degenerate = policy;
        self
    }

    /// Fetch the feed at `location` and ingest it.
    pub async fn run_pass(&self, source: &dyn FeedSource, location: &str) -> Result<PassSummary> {
        let progress = PassProgress::new(PassStage::Fetched);
        let result = tokio::time::timeout(
            self.deadline,
            self.fetch_stages(source, location, &progress),
        )
        .await;

        self.finish(result, &progress)
    }

    /// Ingest an already fetched feed.
    pub async fn ingest_feed(&self, feed: &Feed) -> Result<PassSummary> {
        let progress = PassProgress::new(PassStage::Normalized);
        let result = tokio::time::timeout(self.deadline, self.ingest_stages(feed, &progress)).await;

        self.finish(result, &progress)
    }

    /// Map every entry of `feed` to a store-ready record.
    pub fn normalize_feed(&self, feed: &Feed) -> NormalizedBatch {
        prepare_batch(feed, self.degenerate)
    }

    async fn fetch_stages(
        &self,
        source: &dyn FeedSource,
        location: &str,
        progress: &PassProgress,
    ) -> Result<PassSummary> {
        log::info!("Fetching {}", location);
        let feed = source
            .fetch(location)
            .await
            .map_err(|e| e.in_stage(PassStage::Fetched))?;
        log::info!("Fetched {} entries from '{}'", feed.entries.len(), feed.title);
        self.ingest_stages(&feed, progress).await
    }

    async fn ingest_stages(&self, feed: &Feed, progress: &PassProgress) -> Result<PassSummary> {
        let mut summary = PassSummary::new(&feed.title);

        progress.advance(PassStage::Normalized);
        let batch = self.normalize_feed(feed);
        summary.normalized = batch.normalized;
        summary.rejected = batch.rejected;
        summary.submitted = batch.records.len();
        log::info!(
            "Normalized {} entries ({} rejected, {} to store)",
            batch.normalized,
            batch.rejected,
            batch.records.len()
        );

        if batch.records.is_empty() {
            log::info!("Nothing to store");
            progress.advance(PassStage::Done);
            return Ok(summary);
        }

        // Any record may be inserted before the deadline cuts the batch short.
        progress.advance(PassStage::Stored);
        progress.set_pending(batch.records.iter().map(|r| r.id.clone()));
        let outcome = self
            .store
            .upsert_batch(&batch.records)
            .await
            .map_err(|e| e.in_stage(PassStage::Stored))?;
        log::info!(
            "Stored {} records: {} new, {} updated, {} failed",
            outcome.total(),
            outcome.inserted.len(),
            outcome.updated.len(),
            outcome.failed.len()
        );
        summary.updated = outcome.updated.len();
        summary.store_failures = outcome.failed;
        summary.inserted = outcome.inserted;
        progress.set_pending(summary.inserted.iter().cloned());

        progress.advance(PassStage::Notified);
        let report = self
            .notifier
            .publish_each(&summary.inserted, |id| progress.announced(id))
            .await;
        summary.notified = report.published.len();
        summary.notify_failures = report.failed;

        progress.advance(PassStage::Done);
        Ok(summary)
    }

    fn finish(
        &self,
        result: std::result::Result<Result<PassSummary>, tokio::time::error::Elapsed>,
        progress: &PassProgress,
    ) -> Result<PassSummary> {
        let result = match result {
            Ok(result) => result,
            Err(_) => {
                let (stage, pending) = progress.snapshot();
                Err(AppError::Timeout {
                    stage,
                    after: self.deadline,
                    pending,
                })
            }
        };

        match result {
            Ok(summary) => {
                summary.log();
                Ok(summary)
            }
            Err(e) => {
                log::error!("Pass failed: {}", e);
                if !e.pending().is_empty() {
                    log::warn!("Ids still to publish: {}", e.pending().join(", "));
                }
                Err(e)
            }
        }
    }
}

/// Map every entry to a record, applying the degenerate-id policy and
/// collapsing duplicate ids (first occurrence wins).
pub fn prepare_batch(feed: &Feed, policy: DegeneratePolicy) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    let mut seen = HashSet::new();

    for entry in &feed.entries {
        let record = normalize(entry, &feed.title);
        batch.normalized += 1;

        if is_degenerate(&entry.guid, &record.link) {
            match policy {
                DegeneratePolicy::Accept => {
                    log::warn!(
                        "Entry '{}' has neither guid nor link; id {} depends on pubDate only",
                        record.title,
                        record.id
                    );
                }
                DegeneratePolicy::Reject => {
                    log::warn!("Rejecting entry '{}': no guid and no link", record.title);
                    batch.rejected += 1;
                    continue;
                }
            }
        }

        if !seen.insert(record.id.clone()) {
            log::debug!("Duplicate id {} in feed, keeping first entry", record.id);
            continue;
        }
        batch.records.push(record);
    }

    batch
}

/// Where a running pass is, readable after the deadline drops it.
///
/// `pending` holds ids that may be new but are not announced yet: every
/// submitted id while the store runs, then the inserted ids minus those
/// already published.
#[derive(Debug)]
struct PassProgress {
    state: Mutex<(PassStage, HashSet<String>)>,
}

impl PassProgress {
    fn new(stage: PassStage) -> Self {
        Self {
            state: Mutex::new((stage, HashSet::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, (PassStage, HashSet<String>)> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn advance(&self, stage: PassStage) {
        self.lock().0 = stage;
    }

    fn set_pending(&self, ids: impl IntoIterator<Item = String>) {
        self.lock().1 = ids.into_iter().collect();
    }

    fn announced(&self, id: &str) {
        self.lock().1.remove(id);
    }

    /// Current stage and the sorted pending ids.
    fn snapshot(&self) -> (PassStage, Vec<String>) {
        let state = self.lock();
        let mut pending: Vec<String> = state.1.iter().cloned().collect();
        pending.sort();
        (state.0, pending)
    }
}
