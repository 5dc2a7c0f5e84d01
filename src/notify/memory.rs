//! In-process event log for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::NewRecordEvent;
use crate::notify::EventLog;

/// Channel-keyed in-memory log with injectable failures.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    channels: Mutex<HashMap<String, Vec<NewRecordEvent>>>,
    failing_ids: Mutex<HashSet<String>>,
    append_calls: AtomicUsize,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every append of this id fail.
    pub fn fail_id(&self, id: impl Into<String>) {
        self.failing_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.into());
    }

    /// Events appended to a channel, in append order.
    pub fn events(&self, channel: &str) -> Vec<NewRecordEvent> {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of append attempts, failed ones included.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, channel: &str, event: &NewRecordEvent) -> Result<String> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failing_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&event.id);
        if failing {
            return Err(AppError::storage("injected append failure"));
        }

        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let entries = channels.entry(channel.to_string()).or_default();
        entries.push(event.clone());
        Ok(format!("0-{}", entries.len()))
    }

    async fn entry_count(&self, channel: &str) -> Result<usize> {
        Ok(self.events(channel).len())
    }
}
