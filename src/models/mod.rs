// src/models/mod.rs

//! Domain models for the aggregator.
//!
//! Feed-side shapes (`Feed`, `RawEntry`), the persisted `CanonicalRecord`,
//! the `NewRecordEvent` announcement, and configuration.

mod config;
mod entry;
mod record;

// Re-export all public types
pub use config::{
    Config, DegeneratePolicy, EventBackend, EventsConfig, FeedConfig, LoggingConfig,
    PipelineConfig, StorageBackend, StorageConfig,
};
pub use entry::{Feed, RawCategory, RawEntry};
pub use record::{CanonicalRecord, Category, Location, NewRecordEvent};
