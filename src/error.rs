// src/error.rs

//! Unified error handling for the aggregator.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::PassStage;

/// Result type alias for aggregator operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Feed could not be retrieved
    #[error("Fetch error for {location}: {message}")]
    Fetch { location: String, message: String },

    /// Feed body could not be decoded
    #[error("Decode error for {location}: {message}")]
    Decode { location: String, message: String },

    /// Store backend unreachable or batch rejected
    #[error("Storage error: {0}")]
    Storage(String),

    /// Store connection lost mid-batch after some records were inserted
    #[error("Storage interrupted: {message} ({} inserted ids not announced)", .pending.len())]
    StoreInterrupted {
        message: String,
        pending: Vec<String>,
    },

    /// A single event could not be appended to the log
    #[error("Notify error for {id} on {channel}: {message}")]
    Notify {
        id: String,
        channel: String,
        message: String,
    },

    /// The pass deadline expired; `pending` may be new but were not announced
    #[error("Pass timed out after {after:?} during {stage} stage ({} ids not announced)", .pending.len())]
    Timeout {
        stage: PassStage,
        after: Duration,
        pending: Vec<String>,
    },

    /// A lower-level failure tagged with the stage it happened in
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: PassStage,
        #[source]
        source: Box<AppError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a fetch error for a feed location.
    pub fn fetch(location: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            location: location.into(),
            message: message.to_string(),
        }
    }

    /// Create a decode error for a feed location.
    pub fn decode(location: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Decode {
            location: location.into(),
            message: message.to_string(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a notify error for one record id.
    pub fn notify(
        id: impl Into<String>,
        channel: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::Notify {
            id: id.into(),
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Tag this error with the pipeline stage it surfaced in.
    ///
    /// Errors that already carry a stage are returned unchanged.
    pub fn in_stage(self, stage: PassStage) -> Self {
        match self {
            Self::Stage { .. } | Self::Timeout { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Ids that may have been inserted but were never announced.
    ///
    /// Publishing them again is harmless, so callers can hand them to a retry.
    pub fn pending(&self) -> &[String] {
        match self {
            Self::Timeout { pending, .. } | Self::StoreInterrupted { pending, .. } => pending,
            Self::Stage { source, .. } => source.pending(),
            _ => &[],
        }
    }

    /// The stage this error was tagged with, if any.
    pub fn stage(&self) -> Option<PassStage> {
        match self {
            Self::Stage { stage, .. } | Self::Timeout { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
