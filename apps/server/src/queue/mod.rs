//! Batch job queue
//!
//! Two backends implement [`JobQueue`]: a durable Postgres queue shared between server
//! and worker processes, and an in-process queue for single-node deployments and tests.

mod handle;
mod memory;
mod models;
mod postgres;
mod traits;

pub use handle::QueueHandle;
pub use memory::MemoryJobQueue;
pub use models::{
    BatchJobParams, Job, JobListFilter, JobStatus, RetentionPolicy, RetryPolicy,
};
pub use postgres::PostgresJobQueue;
pub use traits::JobQueue;
