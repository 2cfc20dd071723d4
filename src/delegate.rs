//! Delegate model. A delegate is the authorization principal:
//! a node in a hierarchical token tree whose children's capabilities are
//! always a subset of their parent's.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::codec::NodeKey;
use crate::common::error::CoreError;
use crate::ids::DelegateId;
use crate::store::{MetadataStore, Precondition};

/// Scope binding: exactly one of these two, or neither for an unrestricted
/// root delegate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScopeBinding {
    /// Bound to a single arbitrary CAS node.
    Node(NodeKey),
    /// Bound to a set-node enumerating multiple scope roots.
    Set(NodeKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Capabilities {
    pub can_upload: bool,
    pub can_manage_depot: bool,
}

impl Capabilities {
    /// A child's capability set must be a subset of its parent's.
    pub fn is_subset_of(&self, parent: &Capabilities) -> bool {
        (!self.can_upload || parent.can_upload) && (!self.can_manage_depot || parent.can_manage_depot)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TokenState {
    pub current_rt_hash: Option<String>,
    pub current_at_hash: Option<String>,
    pub at_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub is_revoked: bool,
}

impl Default for TokenState {
    fn default() -> Self {
        Self { current_rt_hash: None, current_at_hash: None, at_expires_at: None, is_revoked: false }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Delegate {
    pub delegate_id: DelegateId,
    pub realm: String,
    pub parent_id: Option<DelegateId>,
    /// `[root, ..., self]`, length 1..=16.
    pub chain: Vec<DelegateId>,
    pub capabilities: Capabilities,
    pub scope: Option<ScopeBinding>,
    pub token: TokenState,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Delegate {
    pub fn depth(&self) -> usize {
        self.chain.len() - 1
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_revoked(&self) -> bool {
        self.token.is_revoked
    }
}

/// Create a new delegate, validating the chain/capability invariants.
pub fn new_child(
    delegate_id: DelegateId,
    parent: &Delegate,
    capabilities: Capabilities,
    scope: Option<ScopeBinding>,
) -> Result<Delegate, CoreError> {
    if parent.is_revoked() {
        return Err(CoreError::authorization("PARENT_REVOKED", "parent delegate is revoked"));
    }
    if parent.chain.len() >= 16 {
        return Err(CoreError::validation("CHAIN_TOO_DEEP", "delegate chain depth limit is 16"));
    }
    if !capabilities.is_subset_of(&parent.capabilities) {
        return Err(CoreError::validation(
            "CAPABILITY_ESCALATION",
            "child capabilities must be a subset of the parent's",
        ));
    }

    let mut chain = parent.chain.clone();
    chain.push(delegate_id);

    Ok(Delegate {
        delegate_id,
        realm: parent.realm.clone(),
        parent_id: Some(parent.delegate_id),
        chain,
        capabilities,
        scope,
        token: TokenState::default(),
        created_at: chrono::Utc::now(),
    })
}

pub fn new_root(delegate_id: DelegateId, realm: impl Into<String>, capabilities: Capabilities) -> Delegate {
    Delegate {
        delegate_id,
        realm: realm.into(),
        parent_id: None,
        chain: vec![delegate_id],
        capabilities,
        scope: None,
        token: TokenState::default(),
        created_at: chrono::Utc::now(),
    }
}

fn storage_key(id: &DelegateId) -> String {
    format!("delegate#{id}")
}

/// Metadata-store-backed delegate directory.
pub struct DelegateStore {
    metadata: Arc<dyn MetadataStore>,
    /// Token rotation is a compare-and-set keyed by the expected RT hash;
    /// a local lock keeps the read-modify-write atomic in front of the
    /// metadata store's own precondition.
    rotate_lock: RwLock<()>,
}

impl DelegateStore {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata, rotate_lock: RwLock::new(()) }
    }

    pub async fn create(&self, delegate: &Delegate) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(delegate).map_err(|e| CoreError::internal(e.to_string()))?;
        self.metadata.put_if(&storage_key(&delegate.delegate_id), bytes, Precondition::Absent).await?;
        Ok(())
    }

    pub async fn get(&self, id: &DelegateId) -> Result<Option<Delegate>, CoreError> {
        match self.metadata.get(&storage_key(id)).await? {
            Some(bytes) => {
                let delegate = serde_json::from_slice(&bytes).map_err(|e| CoreError::internal(e.to_string()))?;
                Ok(Some(delegate))
            }
            None => Ok(None),
        }
    }

    pub async fn revoke(&self, id: &DelegateId) -> Result<(), CoreError> {
        let _guard = self.rotate_lock.write().await;
        let mut delegate = self
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("DELEGATE_NOT_FOUND", id.to_string()))?;
        delegate.token.is_revoked = true;
        let bytes = serde_json::to_vec(&delegate).map_err(|e| CoreError::internal(e.to_string()))?;
        self.metadata.put_if(&storage_key(id), bytes, Precondition::None).await?;
        Ok(())
    }

    /// Compare-and-set token rotation keyed by the expected RT hash;
    /// concurrent rotations are resolved by failing all but one.
    pub async fn rotate_token(
        &self,
        id: &DelegateId,
        expected_rt_hash: Option<&str>,
        new_rt_hash: String,
        new_at_hash: String,
        at_expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CoreError> {
        let _guard = self.rotate_lock.write().await;
        let mut delegate = self
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("DELEGATE_NOT_FOUND", id.to_string()))?;

        if delegate.token.current_rt_hash.as_deref() != expected_rt_hash {
            return Err(CoreError::authorization("TOKEN_INVALID", "refresh token hash mismatch"));
        }

        delegate.token.current_rt_hash = Some(new_rt_hash);
        delegate.token.current_at_hash = Some(new_at_hash);
        delegate.token.at_expires_at = Some(at_expires_at);

        let bytes = serde_json::to_vec(&delegate).map_err(|e| CoreError::internal(e.to_string()))?;
        self.metadata.put_if(&storage_key(id), bytes, Precondition::None).await?;
        Ok(())
    }
}
