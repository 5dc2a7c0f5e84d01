//! The ingestion pipeline.
//!
//! - `identity`: content-addressed record ids
//! - `normalize`: raw entry to canonical record
//! - `ingest`: the pass orchestrator

pub mod identity;
pub mod ingest;
pub mod normalize;

pub use identity::{assign_id, is_degenerate};
pub use ingest::{IngestPipeline, NormalizedBatch, PassStage, PassSummary, prepare_batch};
pub use normalize::normalize;
