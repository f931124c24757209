//! Background workers
//!
//! Workers claim ingest jobs from the queue and run them through the batch processor.
//! They run embedded in the server process or standalone via `riskwatch-worker`.

pub mod base;
pub mod batch_worker;
pub mod runner;
pub mod state;

pub use base::Worker;
pub use batch_worker::BatchIngestWorker;
pub use runner::{jittered_duration, spawn_workers_with_config, WorkerRunnerConfig};
pub use state::{create_workers, WorkerState};
