//! Local filesystem record store.
//!
//! One pretty-printed JSON document per record:
//!
//! ```text
//! {root}/
//! ├── 071864e31d91cce803dedabcc35355ad8cd5c3df.json
//! ├── 12b7e93d0aec9c3e3ffd031d17e45b80e5368dd3.json
//! └── .<id>.<pid>.<seq>.tmp     # in-flight writes
//! ```
//!
//! Inserts are atomic compare-and-set: the document is fully written to a
//! temp file, then hard-linked to its final name, which fails if the id is
//! already present. Updates go through write-to-temp then rename.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::CanonicalRecord;
use crate::storage::{RecordStore, UpsertOutcome, UpsertStatus};

const DEFAULT_CONCURRENCY: usize = 8;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root_dir: PathBuf,
    max_concurrent: usize,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self::with_concurrency(root_dir, DEFAULT_CONCURRENCY)
    }

    /// Create a LocalStore with a custom per-batch write fan-out.
    pub fn with_concurrency(root_dir: impl Into<PathBuf>, max_concurrent: usize) -> Self {
        Self {
            root_dir: root_dir.into(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Document path for a record id.
    fn path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::validation(format!("invalid record id {:?}", id)));
        }
        Ok(self.root_dir.join(format!("{}.json", id)))
    }

    fn tmp_path(&self, id: &str) -> PathBuf {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        self.root_dir
            .join(format!(".{}.{}.{}.tmp", id, std::process::id(), seq))
    }

    /// Write bytes to a file and flush them to disk.
    async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Read JSON data, returning None if the file doesn't exist.
    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn tagged(&self, record: &CanonicalRecord) -> (String, Result<UpsertStatus>) {
        (record.id.clone(), self.upsert_one(record).await)
    }

    async fn upsert_one(&self, record: &CanonicalRecord) -> Result<UpsertStatus> {
        let path = self.path(&record.id)?;
        let tmp = self.tmp_path(&record.id);

        let result = self.write_document(record, &path, &tmp).await;

        // Linked or renamed away already in the common case.
        match tokio::fs::remove_file(&tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::debug!("Could not remove {}: {}", tmp.display(), e),
        }

        result
    }

    async fn write_document(
        &self,
        record: &CanonicalRecord,
        path: &Path,
        tmp: &Path,
    ) -> Result<UpsertStatus> {
        let bytes = serde_json::to_vec_pretty(record)?;
        Self::write_file(tmp, &bytes).await?;

        match tokio::fs::hard_link(tmp, path).await {
            Ok(()) => return Ok(UpsertStatus::Inserted),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(AppError::Io(e)),
        }

        let mut stored: CanonicalRecord = Self::read_json(path).await?.ok_or_else(|| {
            AppError::storage(format!("{} disappeared during update", path.display()))
        })?;
        stored.merge_ingested(record.clone());

        let bytes = serde_json::to_vec_pretty(&stored)?;
        Self::write_file(tmp, &bytes).await?;
        tokio::fs::rename(tmp, path).await?;

        Ok(UpsertStatus::Updated)
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    async fn upsert_batch(&self, records: &[CanonicalRecord]) -> Result<UpsertOutcome> {
        if records.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        tokio::fs::create_dir_all(&self.root_dir)
            .await
            .map_err(|e| {
                AppError::storage(format!(
                    "cannot open record directory {}: {}",
                    self.root_dir.display(),
                    e
                ))
            })?;

        log::debug!(
            "Upserting {} records into {}",
            records.len(),
            self.root_dir.display()
        );

        let mut outcome = UpsertOutcome::default();
        let jobs: Vec<_> = records.iter().map(|record| self.tagged(record)).collect();
        let mut results = stream::iter(jobs).buffer_unordered(self.max_concurrent);

        while let Some((id, result)) = results.next().await {
            outcome.record(id, result);
        }

        Ok(outcome)
    }

    async fn get(&self, id: &str) -> Result<Option<CanonicalRecord>> {
        let path = self.path(id)?;
        Self::read_json(&path).await
    }

    async fn count(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with('.') && name.ends_with(".json") {
                count += 1;
            }
        }
        Ok(count)
    }
}
