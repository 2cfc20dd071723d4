//! Depot Registry. Named versioned CAS roots with optimistic
//! concurrency: commits are compare-and-set against the expected current
//! root, closing the TOCTOU gap between reading a root and writing a new
//! one.

use std::sync::Arc;

use crate::codec::NodeKey;
use crate::common::error::CoreError;
use crate::ids::DepotId;
use crate::store::{Cache, MetadataStore, Precondition};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DepotHistoryEntry {
    pub root: NodeKey,
    pub parent_root: Option<NodeKey>,
    pub committed_at: chrono::DateTime<chrono::Utc>,
    pub diff: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Depot {
    pub realm: String,
    pub depot_id: DepotId,
    pub name: String,
    pub root: NodeKey,
    pub max_history: u32,
    /// `history[0]` is always the most recent commit.
    pub history: Vec<DepotHistoryEntry>,
    pub creator_issuer_id: String,
    pub creator_token_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

fn depot_key(realm: &str, id: &DepotId) -> String {
    format!("depot#{realm}#{id}")
}

fn name_key(realm: &str, name: &str) -> String {
    format!("depotname#{realm}#{name}")
}

fn cache_key(realm: &str, id: &DepotId) -> String {
    format!("depotc#{realm}#{id}")
}

pub struct DepotRegistry {
    metadata: Arc<dyn MetadataStore>,
    cache: Arc<dyn Cache>,
    system_max_history: u32,
}

impl DepotRegistry {
    pub fn new(metadata: Arc<dyn MetadataStore>, cache: Arc<dyn Cache>, system_max_history: u32) -> Self {
        Self { metadata, cache, system_max_history }
    }

    fn serialize(depot: &Depot) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(depot).map_err(|e| CoreError::internal(e.to_string()))
    }

    fn deserialize(bytes: &[u8]) -> Result<Depot, CoreError> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::internal(e.to_string()))
    }

    pub async fn create(
        &self,
        realm: &str,
        depot_id: DepotId,
        name: &str,
        initial_root: NodeKey,
        max_history: u32,
        creator_issuer_id: &str,
        creator_token_id: &str,
    ) -> Result<Depot, CoreError> {
        if max_history == 0 || max_history > self.system_max_history {
            return Err(CoreError::validation(
                "INVALID_MAX_HISTORY",
                format!("maxHistory must be in 1..={}", self.system_max_history),
            ));
        }

        let nk = name_key(realm, name);
        self.metadata
            .put_if(&nk, depot_id.to_string().into_bytes(), Precondition::Absent)
            .await
            .map_err(CoreError::from)
            .map_err(|e| match e {
                CoreError::Conflict { .. } => {
                    CoreError::conflict("DEPOT_NAME_TAKEN", format!("depot name '{name}' already exists in realm"))
                }
                other => other,
            })?;

        let depot = Depot {
            realm: realm.to_string(),
            depot_id,
            name: name.to_string(),
            root: initial_root,
            max_history,
            history: vec![DepotHistoryEntry {
                root: initial_root,
                parent_root: None,
                committed_at: chrono::Utc::now(),
                diff: None,
            }],
            creator_issuer_id: creator_issuer_id.to_string(),
            creator_token_id: creator_token_id.to_string(),
            created_at: chrono::Utc::now(),
        };

        let bytes = Self::serialize(&depot)?;
        self.metadata.put_if(&depot_key(realm, &depot_id), bytes, Precondition::Absent).await?;
        Ok(depot)
    }

    pub async fn get(&self, realm: &str, depot_id: &DepotId) -> Result<Depot, CoreError> {
        if let Some(cached) = self.cache.get(&cache_key(realm, depot_id)).await {
            if let Ok(depot) = Self::deserialize(cached.as_bytes()) {
                return Ok(depot);
            }
        }

        let bytes = self
            .metadata
            .get(&depot_key(realm, depot_id))
            .await?
            .ok_or_else(|| CoreError::not_found("DEPOT_NOT_FOUND", depot_id.to_string()))?;
        let depot = Self::deserialize(&bytes)?;

        if let Ok(text) = String::from_utf8(bytes) {
            self.cache.set(&cache_key(realm, depot_id), text, Some(std::time::Duration::from_secs(10))).await;
        }
        Ok(depot)
    }

    pub async fn get_by_name(&self, realm: &str, name: &str) -> Result<Depot, CoreError> {
        let bytes = self
            .metadata
            .get(&name_key(realm, name))
            .await?
            .ok_or_else(|| CoreError::not_found("DEPOT_NOT_FOUND", name.to_string()))?;
        let depot_id: DepotId = String::from_utf8(bytes)
            .map_err(|e| CoreError::internal(e.to_string()))?
            .parse()
            .map_err(|_: CoreError| CoreError::internal("corrupt depot name index"))?;
        self.get(realm, &depot_id).await
    }

    /// Optimistic-concurrency commit: fails with `DepotConflict` if
    /// `expected_root` disagrees with the current root (including the
    /// first-commit null case).
    pub async fn commit(
        &self,
        realm: &str,
        depot_id: &DepotId,
        new_root: NodeKey,
        expected_root: Option<NodeKey>,
        diff: Option<String>,
    ) -> Result<Depot, CoreError> {
        let mut depot = self.get(realm, depot_id).await?;

        if expected_root != Some(depot.root) {
            return Err(CoreError::depot_conflict(Some(depot.root), expected_root));
        }

        let old_root = depot.root;
        let old_bytes = Self::serialize(&depot)?;

        let mut history = vec![DepotHistoryEntry {
            root: new_root,
            parent_root: Some(old_root),
            committed_at: chrono::Utc::now(),
            diff,
        }];
        for entry in depot.history.into_iter() {
            if entry.root != new_root {
                history.push(entry);
            }
        }
        history.truncate(depot.max_history as usize);

        depot.root = new_root;
        depot.history = history;

        let new_bytes = Self::serialize(&depot)?;
        self.metadata
            .put_if(&depot_key(realm, depot_id), new_bytes, Precondition::Equals(old_bytes))
            .await
            .map_err(CoreError::from)
            .map_err(|e| match e {
                CoreError::Conflict { .. } => CoreError::depot_conflict(None, expected_root),
                other => other,
            })?;
        self.cache.del(&cache_key(realm, depot_id)).await;
        Ok(depot)
    }

    pub async fn update(
        &self,
        realm: &str,
        depot_id: &DepotId,
        new_name: Option<String>,
        new_max_history: Option<u32>,
    ) -> Result<Depot, CoreError> {
        let mut depot = self.get(realm, depot_id).await?;
        let old_bytes = Self::serialize(&depot)?;

        if let Some(name) = &new_name {
            let nk = name_key(realm, name);
            self.metadata.put_if(&nk, depot_id.to_string().into_bytes(), Precondition::Absent).await?;
            self.metadata.delete(&name_key(realm, &depot.name)).await?;
            depot.name = name.clone();
        }

        if let Some(max_history) = new_max_history {
            if max_history == 0 || max_history > self.system_max_history {
                return Err(CoreError::validation("INVALID_MAX_HISTORY", "maxHistory out of range"));
            }
            depot.max_history = max_history;
            depot.history.truncate(max_history as usize);
        }

        let new_bytes = Self::serialize(&depot)?;
        self.metadata
            .put_if(&depot_key(realm, depot_id), new_bytes, Precondition::Equals(old_bytes))
            .await?;
        self.cache.del(&cache_key(realm, depot_id)).await;
        Ok(depot)
    }

    pub async fn delete(&self, realm: &str, depot_id: &DepotId) -> Result<(), CoreError> {
        let depot = self.get(realm, depot_id).await?;
        self.metadata.delete(&depot_key(realm, depot_id)).await?;
        self.metadata.delete(&name_key(realm, &depot.name)).await?;
        self.cache.del(&cache_key(realm, depot_id)).await;
        Ok(())
    }

    /// Resolve a historical version for a depot-version proof. Version
    /// `0` is the current root; `n` walks back `n` entries in history.
    pub async fn resolve_version(&self, realm: &str, depot_id: &DepotId, version: u32) -> Result<NodeKey, CoreError> {
        let depot = self.get(realm, depot_id).await?;
        depot
            .history
            .get(version as usize)
            .map(|e| e.root)
            .ok_or_else(|| CoreError::not_found("DEPOT_VERSION_NOT_FOUND", format!("version {version}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryCache, MemoryMetadataStore};

    fn registry() -> DepotRegistry {
        DepotRegistry::new(Arc::new(MemoryMetadataStore::new()), Arc::new(MemoryCache::new()), 50)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let reg = registry();
        let root = NodeKey::from_bytes([1u8; 16]);
        let id = DepotId::from_bytes([9u8; 16]);
        reg.create("realm-a", id, "main", root, 10, "issuer", "token").await.unwrap();

        let depot = reg.get("realm-a", &id).await.unwrap();
        assert_eq!(depot.root, root);
        assert_eq!(depot.history.len(), 1);

        let by_name = reg.get_by_name("realm-a", "main").await.unwrap();
        assert_eq!(by_name.depot_id, id);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let reg = registry();
        let root = NodeKey::from_bytes([1u8; 16]);
        reg.create("realm-a", DepotId::from_bytes([1u8; 16]), "main", root, 10, "i", "t").await.unwrap();
        let result = reg.create("realm-a", DepotId::from_bytes([2u8; 16]), "main", root, 10, "i", "t").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_commit_optimistic_concurrency() {
        let reg = registry();
        let root = NodeKey::from_bytes([1u8; 16]);
        let id = DepotId::from_bytes([9u8; 16]);
        reg.create("realm-a", id, "main", root, 10, "i", "t").await.unwrap();

        let new_root = NodeKey::from_bytes([2u8; 16]);
        let conflict = reg.commit("realm-a", &id, new_root, Some(NodeKey::from_bytes([99u8; 16])), None).await;
        assert!(matches!(conflict, Err(CoreError::Conflict { code: "DEPOT_CONFLICT", .. })));

        let depot = reg.commit("realm-a", &id, new_root, Some(root), None).await.unwrap();
        assert_eq!(depot.root, new_root);
        assert_eq!(depot.history.len(), 2);
        assert_eq!(depot.history[0].root, new_root);
        assert_eq!(depot.history[0].parent_root, Some(root));
    }

    #[tokio::test]
    async fn test_history_truncated_to_max() {
        let reg = registry();
        let root = NodeKey::from_bytes([0u8; 16]);
        let id = DepotId::from_bytes([9u8; 16]);
        reg.create("realm-a", id, "main", root, 2, "i", "t").await.unwrap();

        let mut current = root;
        for i in 1..=3u8 {
            let next = NodeKey::from_bytes([i; 16]);
            reg.commit("realm-a", &id, next, Some(current), None).await.unwrap();
            current = next;
        }

        let depot = reg.get("realm-a", &id).await.unwrap();
        assert_eq!(depot.history.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_version() {
        let reg = registry();
        let root = NodeKey::from_bytes([0u8; 16]);
        let id = DepotId::from_bytes([9u8; 16]);
        reg.create("realm-a", id, "main", root, 10, "i", "t").await.unwrap();
        let next = NodeKey::from_bytes([1u8; 16]);
        reg.commit("realm-a", &id, next, Some(root), None).await.unwrap();

        assert_eq!(reg.resolve_version("realm-a", &id, 0).await.unwrap(), next);
        assert_eq!(reg.resolve_version("realm-a", &id, 1).await.unwrap(), root);
        assert!(reg.resolve_version("realm-a", &id, 5).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_frees_name() {
        let reg = registry();
        let root = NodeKey::from_bytes([0u8; 16]);
        let id = DepotId::from_bytes([9u8; 16]);
        reg.create("realm-a", id, "main", root, 10, "i", "t").await.unwrap();
        reg.delete("realm-a", &id).await.unwrap();
        assert!(reg.get("realm-a", &id).await.is_err());
        reg.create("realm-a", DepotId::from_bytes([2u8; 16]), "main", root, 10, "i", "t").await.unwrap();
    }
}
