use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::storage::{ObjectStore, StoreResult};

/// Process-local store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: DashMap<String, Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()> {
        self.objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        Ok(self.objects.get(key).map(|v| v.value().clone()))
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|kv| kv.key().starts_with(prefix))
            .map(|kv| kv.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.objects.remove(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let before = self.objects.len();
        self.objects.retain(|key, _| !key.starts_with(prefix));
        Ok(before - self.objects.len())
    }
}
