// ============================================
// Online Key-Value Store
// ============================================
// Read-only access to precomputed recommendation blobs
// (popular list, i2i neighbours) written by the batch pipelines.

mod redis_store;

pub use redis_store::RedisStore;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Single-key read. `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Map-backed store for local runs and tests.
#[derive(Default)]
pub struct InMemoryStore {
    entries: DashMap<String, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_get() {
        let store = InMemoryStore::new();
        store.insert("output:popular", "{}");

        assert_eq!(store.get("output:popular").await.unwrap().as_deref(), Some("{}"));
        assert!(store.get("output:i2i:missing").await.unwrap().is_none());
    }
}
