//! In-memory collaborator implementations — used by tests and the `demo`
//! binary mode. `Arc<RwLock<HashMap<..>>>` guarding a single map, cloned
//! cheaply for shared ownership across the composition root.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::codec::NodeKey;

use super::traits::{Cache, MetadataStore, NodeStore, Page, Precondition, StoreError, StoreResult};

/// `Arc<RwLock<HashMap<NodeKey, Vec<u8>>>>` node store.
#[derive(Clone, Default)]
pub struct MemoryNodeStore {
    nodes: Arc<RwLock<HashMap<NodeKey, Vec<u8>>>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn put(&self, key: NodeKey, bytes: Vec<u8>) -> StoreResult<()> {
        self.nodes.write().await.entry(key).or_insert(bytes);
        Ok(())
    }

    async fn get(&self, key: &NodeKey) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.nodes.read().await.get(key).cloned())
    }

    async fn has(&self, key: &NodeKey) -> StoreResult<bool> {
        Ok(self.nodes.read().await.contains_key(key))
    }
}

/// In-memory `MetadataStore` with the CAS primitive implemented directly
/// over a `HashMap` guarded by a single `RwLock` — the lock itself gives
/// the linearizability `put_if` needs, no separate compare step required.
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_if(&self, key: &str, value: Vec<u8>, precondition: Precondition) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let current = entries.get(key);
        match &precondition {
            Precondition::Absent if current.is_some() => {
                return Err(StoreError::PreconditionFailed(key.to_string()));
            }
            Precondition::Equals(expected) if current != Some(expected) => {
                return Err(StoreError::PreconditionFailed(key.to_string()));
            }
            _ => {}
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str, cursor: Option<String>, limit: usize) -> StoreResult<Page> {
        let entries = self.entries.read().await;
        let mut matching: Vec<(&String, &Vec<u8>)> =
            entries.iter().filter(|(k, _)| k.starts_with(prefix)).collect();
        matching.sort_by(|a, b| a.0.cmp(b.0));

        let start = match &cursor {
            Some(c) => matching.partition_point(|(k, _)| *k <= c),
            None => 0,
        };

        let window = &matching[start.min(matching.len())..];
        let items: Vec<(String, Vec<u8>)> =
            window.iter().take(limit).map(|(k, v)| ((*k).clone(), (*v).clone())).collect();

        let next_cursor = if window.len() > limit { items.last().map(|(k, _)| k.clone()) } else { None };

        Ok(Page { items, next_cursor })
    }
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-memory cache with lazy per-entry expiry — expired entries are
/// dropped on next access rather than via a background sweep.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_live(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(e) if e.expires_at.map(|t| t > Instant::now()).unwrap_or(true) => Some(e.value.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.get_live(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries.write().await.insert(key.to_string(), CacheEntry { value, expires_at });
    }

    async fn del(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn mget(&self, keys: &[String]) -> Vec<Option<String>> {
        let mut out = Vec::with_capacity(keys.len());
        for k in keys {
            out.push(self.get_live(k).await);
        }
        out
    }
}

/// Cache that never stores anything — exists to exercise cache
/// transparency: swapping it in for any other `Cache` implementation
/// must not change observable results.
#[derive(Clone, Default)]
pub struct NullCache;

#[async_trait]
impl Cache for NullCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Option<Duration>) {}

    async fn del(&self, _key: &str) {}

    async fn mget(&self, keys: &[String]) -> Vec<Option<String>> {
        vec![None; keys.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_node_store_put_get() {
        let store = MemoryNodeStore::new();
        let key = NodeKey::from_bytes([1u8; 16]);
        store.put(key, b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(b"hello".to_vec()));
        assert!(store.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_if_absent_conflict() {
        let store = MemoryMetadataStore::new();
        store.put_if("k", b"a".to_vec(), Precondition::Absent).await.unwrap();
        let result = store.put_if("k", b"b".to_vec(), Precondition::Absent).await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn test_put_if_equals_cas() {
        let store = MemoryMetadataStore::new();
        store.put_if("k", b"a".to_vec(), Precondition::Absent).await.unwrap();
        store.put_if("k", b"b".to_vec(), Precondition::Equals(b"a".to_vec())).await.unwrap();
        let stale = store.put_if("k", b"c".to_vec(), Precondition::Equals(b"a".to_vec())).await;
        assert!(matches!(stale, Err(StoreError::PreconditionFailed(_))));
        assert_eq!(store.get("k").await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn test_list_prefix_and_pagination() {
        let store = MemoryMetadataStore::new();
        for i in 0..5 {
            store.put_if(&format!("p#{i}"), vec![i as u8], Precondition::None).await.unwrap();
        }
        store.put_if("q#0", vec![9], Precondition::None).await.unwrap();

        let page = store.list("p#", None, 3).await.unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next_cursor.is_some());

        let page2 = store.list("p#", page.next_cursor, 3).await.unwrap();
        assert_eq!(page2.items.len(), 2);
        assert!(page2.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let cache = MemoryCache::new();
        cache.set("k", "v".to_string(), Some(Duration::from_millis(1))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_null_cache_always_misses() {
        let cache = NullCache;
        cache.set("k", "v".to_string(), None).await;
        assert_eq!(cache.get("k").await, None);
    }
}
