//! Read-side cache
//!
//! Handlers cache serialized list pages and aggregates behind [`CacheHandle`]. Every
//! cache operation is best-effort: an absent backend or a backend error behaves like a
//! miss and never fails the caller.

mod invalidator;
pub mod keys;
mod memory;

pub use invalidator::CacheInvalidator;
pub use memory::MemoryCache;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{sync::Arc, time::Duration};

/// Key/value store for serialized read models.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> crate::Result<Option<serde_json::Value>>;

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> crate::Result<()>;

    async fn delete(&self, key: &str) -> crate::Result<()>;

    /// Delete every key matching `pattern`, a literal prefix with an optional trailing `*`.
    /// Returns the number of removed entries.
    async fn delete_prefix(&self, pattern: &str) -> crate::Result<usize>;

    fn backend_name(&self) -> &'static str;
}

/// Optional cache backend shared by handlers and services.
#[derive(Clone, Default)]
pub struct CacheHandle {
    backend: Option<Arc<dyn CacheBackend>>,
}

impl CacheHandle {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn mode(&self) -> &'static str {
        self.backend
            .as_ref()
            .map_or("disabled", |backend| backend.backend_name())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        match backend.get(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    tracing::debug!(key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(key, error = %e, "Cache read failed");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(key, error = %e, "Cache value not serializable");
                return;
            }
        };
        if let Err(e) = backend.set(key, value, ttl).await {
            tracing::debug!(key, error = %e, "Cache write failed");
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Some(backend) = self.backend.as_ref() {
            if let Err(e) = backend.delete(key).await {
                tracing::debug!(key, error = %e, "Cache delete failed");
            }
        }
    }

    pub async fn delete_prefix(&self, pattern: &str) -> usize {
        let Some(backend) = self.backend.as_ref() else {
            return 0;
        };
        match backend.delete_prefix(pattern).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::debug!(pattern, error = %e, "Cache prefix delete failed");
                0
            }
        }
    }
}
