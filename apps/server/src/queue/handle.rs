//! Queue availability as seen by request handlers

use super::JobQueue;
use std::sync::Arc;

/// The job queue a request may dispatch to.
///
/// Resolved once at startup by probing the configured backend. Handlers consult it to
/// decide between background dispatch and synchronous processing; they never hold a
/// queue reference that may be absent.
#[derive(Clone)]
pub enum QueueHandle {
    Available(Arc<dyn JobQueue>),
    Unavailable,
}

impl QueueHandle {
    /// Probe `queue` with a health check and keep it only if it answers.
    pub async fn probe(queue: Arc<dyn JobQueue>) -> Self {
        match queue.health_check().await {
            Ok(_) => {
                tracing::info!(backend = queue.backend_name(), "Job queue available");
                QueueHandle::Available(queue)
            }
            Err(e) => {
                tracing::warn!(
                    backend = queue.backend_name(),
                    error = %e,
                    "Job queue unreachable; batches will be processed synchronously"
                );
                QueueHandle::Unavailable
            }
        }
    }

    pub fn queue(&self) -> Option<&Arc<dyn JobQueue>> {
        match self {
            QueueHandle::Available(queue) => Some(queue),
            QueueHandle::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, QueueHandle::Available(_))
    }

    /// Processing mode reported in health output.
    pub fn mode(&self) -> &'static str {
        match self {
            QueueHandle::Available(_) => "queued",
            QueueHandle::Unavailable => "synchronous",
        }
    }
}

impl From<Option<Arc<dyn JobQueue>>> for QueueHandle {
    fn from(queue: Option<Arc<dyn JobQueue>>) -> Self {
        queue.map_or(QueueHandle::Unavailable, QueueHandle::Available)
    }
}
