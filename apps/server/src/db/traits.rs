//! Patient store contract

use crate::{
    models::{PatientFilter, PatientRecord, RecordType},
    Result,
};
use async_trait::async_trait;

/// Whether an upsert inserted a new record or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Keyed persistence for patient records.
///
/// Records are keyed by `(record type, identity key)`. Writes to the same key are
/// serialized by the implementation and each upsert is atomic on its own; there are no
/// multi-record transactions.
#[async_trait]
pub trait PatientStore: Send + Sync {
    /// Create the record if absent, otherwise replace it entirely.
    async fn create_or_update(&self, record: &PatientRecord) -> Result<UpsertOutcome>;

    async fn get_by_id(&self, record_type: RecordType, id: &str) -> Result<Option<PatientRecord>>;

    /// Records matching `filter`, ordered by record type then identity key.
    async fn list(&self, filter: &PatientFilter) -> Result<Vec<PatientRecord>>;

    /// Number of records matching `filter`, ignoring its offset and limit.
    async fn count(&self, filter: &PatientFilter) -> Result<usize>;

    async fn delete(&self, record_type: RecordType, id: &str) -> Result<bool>;

    fn backend_name(&self) -> &'static str;
}
