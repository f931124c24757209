//! In-memory `PatientStore` implementation

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::{
    db::traits::{PatientStore, UpsertOutcome},
    models::{PatientFilter, PatientRecord, RecordType},
    Result,
};

type Key = (RecordType, String);

/// Process-local store. Writers hold the map lock for the duration of one upsert,
/// which serializes concurrent writes to the same key.
#[derive(Default)]
pub struct InMemoryPatientStore {
    records: RwLock<BTreeMap<Key, PatientRecord>>,
}

impl InMemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl PatientStore for InMemoryPatientStore {
    async fn create_or_update(&self, record: &PatientRecord) -> Result<UpsertOutcome> {
        let key = (record.record_type(), record.id().to_string());
        let mut records = self.records.write().await;
        match records.insert(key, record.clone()) {
            Some(_) => Ok(UpsertOutcome::Updated),
            None => Ok(UpsertOutcome::Created),
        }
    }

    async fn get_by_id(&self, record_type: RecordType, id: &str) -> Result<Option<PatientRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(record_type, id.to_string())).cloned())
    }

    async fn list(&self, filter: &PatientFilter) -> Result<Vec<PatientRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| filter.matches(r))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &PatientFilter) -> Result<usize> {
        let records = self.records.read().await;
        Ok(records.values().filter(|r| filter.matches(r)).count())
    }

    async fn delete(&self, record_type: RecordType, id: &str) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(&(record_type, id.to_string())).is_some())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
