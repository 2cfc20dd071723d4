//! Ownership Index. Full-chain ownership writes give O(1)
//! positive ownership checks for anything any ancestor delegate uploaded.

use std::sync::Arc;

use crate::codec::NodeKey;
use crate::common::error::CoreError;
use crate::ids::DelegateId;
use crate::store::{Cache, MetadataStore, Precondition};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OwnershipRecord {
    pub node: NodeKey,
    pub subject: DelegateId,
    pub uploaded_by: DelegateId,
    pub content_type: String,
    pub size: u64,
    pub kind: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

fn storage_key(node: &NodeKey, subject: &DelegateId) -> String {
    format!("own#{node}#{subject}")
}

fn cache_key(node: &NodeKey, subject: &DelegateId) -> String {
    format!("ownc#{node}#{subject}")
}

/// Ownership Index backed by a `MetadataStore`, with an optional `Cache`
/// in front of positive lookups. Positive results may be cached without
/// TTL since ownership is immutable once written; negative results are
/// never cached, since ownership can be created at any time.
pub struct OwnershipIndex {
    metadata: Arc<dyn MetadataStore>,
    cache: Arc<dyn Cache>,
}

impl OwnershipIndex {
    pub fn new(metadata: Arc<dyn MetadataStore>, cache: Arc<dyn Cache>) -> Self {
        Self { metadata, cache }
    }

    /// Write one record per chain element in a single logical batch
    /// (bounded by chain depth ≤ 16, so this is one round trip's worth of
    /// work). Idempotent under re-upload: each element's record uses
    /// `Precondition::None` (last writer wins on the immutable value).
    pub async fn add_ownership(
        &self,
        node: NodeKey,
        chain: &[DelegateId],
        uploaded_by: DelegateId,
        content_type: &str,
        size: u64,
        kind: &str,
    ) -> Result<(), CoreError> {
        for subject in chain {
            let record = OwnershipRecord {
                node,
                subject: *subject,
                uploaded_by,
                content_type: content_type.to_string(),
                size,
                kind: kind.to_string(),
                created_at: chrono::Utc::now(),
            };
            let bytes = serde_json::to_vec(&record).map_err(|e| CoreError::internal(e.to_string()))?;
            self.metadata.put_if(&storage_key(&node, subject), bytes, Precondition::None).await?;
            self.cache.set(&cache_key(&node, subject), "1".to_string(), None).await;
        }
        Ok(())
    }

    pub async fn has_ownership(&self, node: &NodeKey, delegate_id: &DelegateId) -> Result<bool, CoreError> {
        if self.cache.get(&cache_key(node, delegate_id)).await.is_some() {
            return Ok(true);
        }
        let found = self.metadata.get(&storage_key(node, delegate_id)).await?.is_some();
        if found {
            self.cache.set(&cache_key(node, delegate_id), "1".to_string(), None).await;
        }
        Ok(found)
    }

    pub async fn has_any_ownership(&self, node: &NodeKey) -> Result<bool, CoreError> {
        let page = self.metadata.list(&format!("own#{node}#"), None, 1).await?;
        Ok(!page.items.is_empty())
    }

    pub async fn list_owners(&self, node: &NodeKey) -> Result<Vec<DelegateId>, CoreError> {
        let mut owners = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.metadata.list(&format!("own#{node}#"), cursor.clone(), 100).await?;
            for (key, _) in &page.items {
                if let Some(subject_text) = key.rsplit('#').next() {
                    if let Ok(id) = subject_text.parse::<DelegateId>() {
                        owners.push(id);
                    }
                }
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(owners)
    }

    /// Bulk check that returns the first positive match among `delegate_ids`.
    pub async fn has_ownership_batch(
        &self,
        node: &NodeKey,
        delegate_ids: &[DelegateId],
    ) -> Result<Option<DelegateId>, CoreError> {
        for id in delegate_ids {
            if self.has_ownership(node, id).await? {
                return Ok(Some(*id));
            }
        }
        Ok(None)
    }
}
