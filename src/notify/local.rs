//! Local append-only event log.
//!
//! One JSON-lines file per channel; entry ids mimic stream ids
//! (`<unix-millis>-<sequence>`) and increase strictly within a process.
//!
//! ```text
//! {root}/
//! └── rss_unprocessed.jsonl
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::NewRecordEvent;
use crate::notify::EventLog;

/// One line of a channel file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub entry_id: String,
    pub id: String,
    pub appended_at: DateTime<Utc>,
}

/// Last issued `(millis, sequence)` pair.
#[derive(Debug, Default)]
struct Cursor {
    millis: i64,
    seq: u64,
}

impl Cursor {
    fn next(&mut self, now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis();
        if millis > self.millis {
            self.millis = millis;
            self.seq = 0;
        } else {
            self.seq += 1;
        }
        format!("{}-{}", self.millis, self.seq)
    }
}

/// File-backed event log.
#[derive(Debug)]
pub struct LocalEventLog {
    root_dir: PathBuf,
    cursor: Mutex<Cursor>,
}

impl LocalEventLog {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            cursor: Mutex::new(Cursor::default()),
        }
    }

    /// File holding a channel's entries.
    fn path(&self, channel: &str) -> PathBuf {
        let name: String = channel
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root_dir.join(format!("{}.jsonl", name))
    }

    /// Read back every entry of a channel.
    pub async fn read(&self, channel: &str) -> Result<Vec<LogEntry>> {
        let content = match tokio::fs::read_to_string(self.path(channel)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AppError::from))
            .collect()
    }

    async fn append_line(path: &Path, line: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

#[async_trait]
impl EventLog for LocalEventLog {
    async fn append(&self, channel: &str, event: &NewRecordEvent) -> Result<String> {
        // Held across the write so file order matches entry id order.
        let mut cursor = self.cursor.lock().await;
        let now = Utc::now();

        let entry = LogEntry {
            entry_id: cursor.next(now),
            id: event.id.clone(),
            appended_at: now,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        Self::append_line(&self.path(channel), &line).await?;
        Ok(entry.entry_id)
    }

    async fn entry_count(&self, channel: &str) -> Result<usize> {
        Ok(self.read(channel).await?.len())
    }
}
