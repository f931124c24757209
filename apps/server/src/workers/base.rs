//! Worker contract

use crate::{queue::Job, Result};
use async_trait::async_trait;

/// A background worker that executes jobs claimed from the queue.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Run a claimed job to a terminal state.
    ///
    /// An `Err` means the job's state could not be recorded; the job then stays active
    /// until stall detection hands it out again.
    async fn process_job(&self, job: Job) -> Result<()>;
}
