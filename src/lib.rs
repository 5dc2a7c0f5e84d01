// src/lib.rs

//! RSS aggregator library.
//!
//! Ingests a syndication feed into an idempotent record store and announces
//! every genuinely new record on an append-only event log.

pub mod error;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{AppError, Result};
