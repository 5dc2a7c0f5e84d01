//! In-process record store for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::CanonicalRecord;
use crate::storage::{RecordStore, UpsertOutcome, UpsertStatus};

/// Map-backed store with the same upsert semantics as the durable backends.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, CanonicalRecord>>,
    batch_calls: AtomicUsize,
    unavailable: AtomicBool,
    failing_ids: Mutex<HashSet<String>>,
    interrupt_after: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `upsert_batch` calls that reached the backend.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Make every following batch fail as if the backend were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make writes of one id fail individually.
    pub fn fail_id(&self, id: impl Into<String>) {
        self.lock_failing().insert(id.into());
    }

    /// Drop the connection after `written` records of the next batches.
    pub fn interrupt_after(&self, written: usize) {
        *self.interrupt_after.lock().unwrap_or_else(|e| e.into_inner()) = Some(written);
    }

    /// Store a record directly, bypassing ingestion semantics.
    pub fn seed(&self, record: CanonicalRecord) {
        self.lock_records().insert(record.id.clone(), record);
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, HashMap<String, CanonicalRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_failing(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.failing_ids.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn upsert_one(
        records: &mut HashMap<String, CanonicalRecord>,
        record: &CanonicalRecord,
    ) -> UpsertStatus {
        match records.get_mut(&record.id) {
            Some(stored) => {
                stored.merge_ingested(record.clone());
                UpsertStatus::Updated
            }
            None => {
                records.insert(record.id.clone(), record.clone());
                UpsertStatus::Inserted
            }
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert_batch(&self, records: &[CanonicalRecord]) -> Result<UpsertOutcome> {
        if records.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::storage("memory store is unavailable"));
        }

        let failing = self.lock_failing().clone();
        let interrupt_after = *self.interrupt_after.lock().unwrap_or_else(|e| e.into_inner());
        let mut stored = self.lock_records();
        let mut outcome = UpsertOutcome::default();

        for (written, record) in records.iter().enumerate() {
            if interrupt_after == Some(written) {
                let mut pending: Vec<String> = outcome.inserted.into_iter().collect();
                pending.sort();
                return Err(AppError::StoreInterrupted {
                    message: format!("connection lost after {} records", written),
                    pending,
                });
            }
            let result = if failing.contains(&record.id) {
                Err(AppError::storage("injected write failure"))
            } else {
                Ok(Self::upsert_one(&mut stored, record))
            };
            outcome.record(record.id.clone(), result);
        }

        Ok(outcome)
    }

    async fn get(&self, id: &str) -> Result<Option<CanonicalRecord>> {
        Ok(self.lock_records().get(id).cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.lock_records().len())
    }
}
