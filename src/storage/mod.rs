//! Durable key-value object storage used for room snapshots and per-room
//! audio objects.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    common::errors::StoreError,
    configs::{StorageBackend, StorageConfig},
};

pub mod backup;
pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()>;

    /// `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Deletes exactly `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Deletes every key starting with `prefix`. Returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> StoreResult<usize>;
}

/// Builds the configured backend.
pub fn from_config(config: &StorageConfig) -> StoreResult<Arc<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Filesystem => {
            let root = config.root.as_deref().ok_or(StoreError::MissingRoot)?;
            Ok(Arc::new(FsStore::new(root)))
        }
    }
}

/// Storage key for an audio url served out of a room's namespace, e.g.
/// `https://cdn.example/room-123456/track.mp3` → `room-123456/track.mp3`.
/// The prefix must start a path segment.
pub fn key_for_url(prefix: &str, url: &str) -> Option<String> {
    let (start, _) = url
        .match_indices(prefix)
        .find(|(at, _)| url[..*at].ends_with('/'))?;
    let key = url[start..].split(['?', '#']).next()?;
    (key.len() > prefix.len()).then(|| key.to_string())
}
