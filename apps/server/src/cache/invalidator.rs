//! Cache invalidation after patient mutations

use super::{keys, CacheHandle};
use crate::models::RecordType;

/// Drops every cached read model that may depend on a mutated record type.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: CacheHandle,
}

impl CacheInvalidator {
    pub fn new(cache: CacheHandle) -> Self {
        Self { cache }
    }

    /// Invalidate after a batch. Batches without a successful upsert changed nothing.
    pub async fn invalidate_after_batch(&self, record_type: RecordType, success_count: usize) {
        if success_count == 0 {
            return;
        }
        self.invalidate_record_type(record_type).await;
    }

    pub async fn invalidate_record_type(&self, record_type: RecordType) {
        if !self.cache.is_enabled() {
            return;
        }

        let removed = self.cache.delete_prefix(&keys::list_pattern(record_type)).await;
        for key in keys::GLOBAL_AGGREGATES {
            self.cache.delete(key).await;
        }

        tracing::debug!(
            record_type = %record_type,
            list_keys_removed = removed,
            "Invalidated cached read models"
        );
    }
}
