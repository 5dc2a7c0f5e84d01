//! Idempotent record storage.
//!
//! Every backend implements insert-if-absent-else-update keyed by record id
//! and reports which ids were created by the call. Ingestion owns `source`,
//! `title`, `description`, `link`, `pubDate` and `categories`; on update the
//! stored `geoLocated` and `locations` are left as they are.
//!
//! ```text
//! upsert_batch([a, b, c])      store before: {b}
//!   ├── a  -> inserted
//!   ├── b  -> updated (enrichment kept)
//!   └── c  -> failed   (collected, does not fail the call)
//! ```

pub mod local;
pub mod memory;
#[cfg(feature = "mongo")]
pub mod mongo;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CanonicalRecord, StorageBackend, StorageConfig};

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;
#[cfg(feature = "mongo")]
pub use mongo::MongoStore;

/// Per-key result of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatus {
    Inserted,
    Updated,
}

/// Aggregate result of an upsert batch.
#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    /// Ids that did not exist before the batch
    pub inserted: HashSet<String>,
    /// Ids that existed and were overwritten
    pub updated: HashSet<String>,
    /// Ids whose individual write failed, with the cause
    pub failed: HashMap<String, String>,
}

impl UpsertOutcome {
    /// Fold one per-record result into the outcome.
    pub fn record(&mut self, id: String, result: Result<UpsertStatus>) {
        match result {
            Ok(UpsertStatus::Inserted) => {
                self.inserted.insert(id);
            }
            Ok(UpsertStatus::Updated) => {
                self.updated.insert(id);
            }
            Err(e) => {
                log::warn!("Upsert failed for {}: {}", id, e);
                self.failed.insert(id, e.to_string());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.failed.is_empty()
    }

    /// Total number of records the outcome accounts for.
    pub fn total(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.failed.len()
    }
}

/// Trait for record store backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or update every record, reporting newly inserted ids.
    ///
    /// Records are independent: one failing record is reported in
    /// [`UpsertOutcome::failed`] without affecting the rest. The call itself
    /// fails only when the backend cannot be reached. An empty batch returns
    /// an empty outcome without touching the backend.
    async fn upsert_batch(&self, records: &[CanonicalRecord]) -> Result<UpsertOutcome>;

    /// Load a stored record by id.
    async fn get(&self, id: &str) -> Result<Option<CanonicalRecord>>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;
}

/// Build the configured store backend.
pub async fn open(config: &StorageConfig, max_concurrent: usize) -> Result<Arc<dyn RecordStore>> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalStore::with_concurrency(
            &config.root_dir,
            max_concurrent,
        ))),
        #[cfg(feature = "mongo")]
        StorageBackend::Mongo => {
            let store = MongoStore::connect(
                &config.mongodb_uri,
                &config.database,
                &config.collection,
                max_concurrent,
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongo"))]
        StorageBackend::Mongo => Err(crate::error::AppError::config(
            "storage backend 'mongo' requires the `mongo` feature",
        )),
    }
}
