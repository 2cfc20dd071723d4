//! Storage collaborators. One trait per collaborator (`traits`),
//! in-memory implementations for tests and `demo` mode (`memory`), and
//! two backends shaped to actually run (`local_fs` for node bytes,
//! `sqlite` for metadata), split between an in-memory store and a
//! persistent one.

pub mod local_fs;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use local_fs::LocalFsNodeStore;
pub use memory::{MemoryCache, MemoryMetadataStore, MemoryNodeStore, NullCache};
pub use sqlite::SqliteMetadataStore;
pub use traits::{Cache, MetadataStore, NodeStore, Page, Precondition, StoreError, StoreResult};

use async_trait::async_trait;
use std::sync::Arc;

use crate::codec::{empty_dnode_bytes, empty_dnode_key, NodeKey};

/// Decorator in front of any `NodeStore` that short-circuits all three
/// operations for well-known nodes (currently just the empty directory)
/// without ever touching the inner backend.
pub struct WellKnownNodeStore {
    inner: Arc<dyn NodeStore>,
}

impl WellKnownNodeStore {
    pub fn new(inner: Arc<dyn NodeStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl NodeStore for WellKnownNodeStore {
    async fn put(&self, key: NodeKey, bytes: Vec<u8>) -> StoreResult<()> {
        if key == empty_dnode_key() {
            return Ok(());
        }
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &NodeKey) -> StoreResult<Option<Vec<u8>>> {
        if *key == empty_dnode_key() {
            return Ok(Some(empty_dnode_bytes()));
        }
        self.inner.get(key).await
    }

    async fn has(&self, key: &NodeKey) -> StoreResult<bool> {
        if *key == empty_dnode_key() {
            return Ok(true);
        }
        self.inner.has(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_well_known_short_circuits_empty_dnode() {
        let inner = Arc::new(MemoryNodeStore::new());
        let store = WellKnownNodeStore::new(inner.clone());

        let key = empty_dnode_key();
        assert!(store.has(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(empty_dnode_bytes()));

        // put is a no-op; the inner store never sees it.
        store.put(key, empty_dnode_bytes()).await.unwrap();
        assert!(!inner.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_passes_through_other_keys() {
        let inner = Arc::new(MemoryNodeStore::new());
        let store = WellKnownNodeStore::new(inner.clone());

        let key = NodeKey::from_bytes([3u8; 16]);
        store.put(key, b"data".to_vec()).await.unwrap();
        assert!(inner.has(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(b"data".to_vec()));
    }
}
