//! In-process LRU cache with per-entry expiry

use super::CacheBackend;
use async_trait::async_trait;
use lru::LruCache;
use std::{
    num::NonZeroUsize,
    sync::Mutex,
    time::{Duration, Instant},
};

struct CacheEntry {
    /// `None` when the TTL overflows the clock; such entries only leave by eviction.
    expires_at: Option<Instant>,
    value: serde_json::Value,
}

/// Bounded cache; least recently used entries are evicted once `capacity` is reached.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> crate::Result<Option<serde_json::Value>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at.map_or(true, |at| at > Instant::now()) => {
                return Ok(Some(entry.value.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> crate::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(
            key.to_string(),
            CacheEntry {
                expires_at: Instant::now().checked_add(ttl),
                value,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> crate::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.pop(key);
        Ok(())
    }

    async fn delete_prefix(&self, pattern: &str) -> crate::Result<usize> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        Ok(doomed.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_expire_after_ttl() {
        let cache = MemoryCache::new(8);
        tokio_test::block_on(async {
            cache.set("a", json!(1), Duration::ZERO).await.unwrap();
            cache.set("b", json!(2), Duration::from_secs(60)).await.unwrap();
            assert_eq!(cache.get("a").await.unwrap(), None);
            assert_eq!(cache.get("b").await.unwrap(), Some(json!(2)));
        });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unbounded_ttl_does_not_overflow() {
        let cache = MemoryCache::new(8);
        tokio_test::block_on(async {
            cache.set("a", json!(1), Duration::MAX).await.unwrap();
            assert_eq!(cache.get("a").await.unwrap(), Some(json!(1)));
        });
    }

    #[test]
    fn prefix_delete_leaves_other_keys() {
        let cache = MemoryCache::new(8);
        let ttl = Duration::from_secs(60);
        tokio_test::block_on(async {
            cache.set("maternal:list:page=1", json!([]), ttl).await.unwrap();
            cache.set("maternal:list:page=2", json!([]), ttl).await.unwrap();
            cache.set("pediatric:list:page=1", json!([]), ttl).await.unwrap();

            assert_eq!(cache.delete_prefix("maternal:list:*").await.unwrap(), 2);
            assert!(cache.get("pediatric:list:page=1").await.unwrap().is_some());
        });
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);
        tokio_test::block_on(async {
            cache.set("a", json!(1), ttl).await.unwrap();
            cache.set("b", json!(2), ttl).await.unwrap();
            cache.get("a").await.unwrap();
            cache.set("c", json!(3), ttl).await.unwrap();
            assert!(cache.get("b").await.unwrap().is_none());
            assert!(cache.get("a").await.unwrap().is_some());
        });
    }
}
