//! Riskwatch: bulk patient risk ingestion.
//!
//! Patient batches (CSV) are parsed, scored and upserted into the risk store either by
//! background workers pulling from a durable job queue, or synchronously in the request
//! path when no queue backend is reachable. Read-side aggregates are cached and
//! invalidated after every mutating batch.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod queue;
pub mod services;
pub mod state;
pub mod workers;

pub use error::{Error, Result};
