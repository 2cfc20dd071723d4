//! Claim Protocol. Lets a delegate acquire ownership of a
//! node already present in the store via proof-of-possession of an access
//! token, without re-uploading the bytes.

use crate::codec::NodeKey;
use crate::common::error::CoreError;
use crate::delegate::Delegate;
use crate::ownership::OwnershipIndex;
use crate::tree::NodeStoreHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// The acting token's context, resolved upstream of the core (token
/// authentication itself is a Non-goal).
pub struct ActingToken {
    pub kind: TokenKind,
    pub can_upload: bool,
    pub realm: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub already_owned: bool,
}

/// `expected = base32(blake3_128_keyed(nodeContent, key = blake3_256(accessTokenBytes)))`.
fn compute_pop(node_content: &[u8], access_token_bytes: &[u8]) -> String {
    let key_hash = blake3::hash(access_token_bytes);
    let mut hasher = blake3::Hasher::new_keyed(key_hash.as_bytes());
    hasher.update(node_content);
    let output = hasher.finalize();
    base32::encode(base32::Alphabet::Crockford, &output.as_bytes()[0..16])
}

pub async fn claim(
    store: &NodeStoreHandle,
    ownership: &OwnershipIndex,
    delegate: &Delegate,
    acting_token: &ActingToken,
    access_token_bytes: &[u8],
    node: NodeKey,
    pop: &str,
) -> Result<ClaimOutcome, CoreError> {
    if acting_token.kind != TokenKind::Access {
        return Err(CoreError::authorization("ACCESS_TOKEN_REQUIRED", "claim requires an access token"));
    }
    if !acting_token.can_upload {
        return Err(CoreError::authorization("UPLOAD_NOT_ALLOWED", "acting token lacks canUpload"));
    }
    if acting_token.realm != delegate.realm {
        return Err(CoreError::authorization("REALM_MISMATCH", "acting token realm does not match delegate realm"));
    }

    if ownership.has_ownership(&node, &delegate.delegate_id).await? {
        return Ok(ClaimOutcome { already_owned: true });
    }

    let content = store
        .get_bytes(&node)
        .await?
        .ok_or_else(|| CoreError::not_found("NODE_NOT_FOUND", node.to_string()))?;

    let expected = compute_pop(&content, access_token_bytes);
    if expected != pop {
        return Err(CoreError::authorization("INVALID_POP", "proof of possession does not match"));
    }

    ownership
        .add_ownership(node, &delegate.chain, delegate.delegate_id, "application/octet-stream", content.len() as u64, "file")
        .await?;

    Ok(ClaimOutcome { already_owned: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{new_root, Capabilities};
    use crate::ids::DelegateId;
    use crate::store::{MemoryCache, MemoryMetadataStore, MemoryNodeStore};
    use std::sync::Arc;

    fn setup() -> (NodeStoreHandle, OwnershipIndex, Delegate) {
        let store = NodeStoreHandle::new(Arc::new(MemoryNodeStore::new()));
        let owner_idx = OwnershipIndex::new(Arc::new(MemoryMetadataStore::new()), Arc::new(MemoryCache::new()));
        let delegate =
            new_root(DelegateId::from_bytes([1u8; 16]), "realm-a", Capabilities { can_upload: true, can_manage_depot: false });
        (store, owner_idx, delegate)
    }

    #[tokio::test]
    async fn test_claim_succeeds_with_correct_pop() {
        let (store, owner_idx, delegate) = setup();
        let (bytes, key) =
            crate::codec::encode_file(b"hello".to_vec(), "text/plain".to_string(), 5, vec![]).unwrap();
        store.put_bytes(key, bytes.clone()).await.unwrap();

        let access_token_bytes = b"secret-token".to_vec();
        let pop = compute_pop(&bytes, &access_token_bytes);

        let token = ActingToken { kind: TokenKind::Access, can_upload: true, realm: "realm-a".to_string() };
        let outcome = claim(&store, &owner_idx, &delegate, &token, &access_token_bytes, key, &pop).await.unwrap();
        assert!(!outcome.already_owned);
        assert!(owner_idx.has_ownership(&key, &delegate.delegate_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_rejects_bad_pop() {
        let (store, owner_idx, delegate) = setup();
        let (bytes, key) =
            crate::codec::encode_file(b"hello".to_vec(), "text/plain".to_string(), 5, vec![]).unwrap();
        store.put_bytes(key, bytes).await.unwrap();

        let token = ActingToken { kind: TokenKind::Access, can_upload: true, realm: "realm-a".to_string() };
        let result = claim(&store, &owner_idx, &delegate, &token, b"token", key, "garbage-pop").await;
        assert!(matches!(result, Err(CoreError::Authorization { code: "INVALID_POP", .. })));
    }

    #[tokio::test]
    async fn test_claim_idempotent_when_already_owned() {
        let (store, owner_idx, delegate) = setup();
        let (bytes, key) =
            crate::codec::encode_file(b"hello".to_vec(), "text/plain".to_string(), 5, vec![]).unwrap();
        store.put_bytes(key, bytes).await.unwrap();
        owner_idx
            .add_ownership(key, &delegate.chain, delegate.delegate_id, "text/plain", 5, "file")
            .await
            .unwrap();

        let token = ActingToken { kind: TokenKind::Access, can_upload: true, realm: "realm-a".to_string() };
        let outcome = claim(&store, &owner_idx, &delegate, &token, b"anything", key, "not-even-checked").await.unwrap();
        assert!(outcome.already_owned);
    }

    #[tokio::test]
    async fn test_claim_requires_upload_capability() {
        let (store, owner_idx, delegate) = setup();
        let key = NodeKey::from_bytes([9u8; 16]);
        let token = ActingToken { kind: TokenKind::Access, can_upload: false, realm: "realm-a".to_string() };
        let result = claim(&store, &owner_idx, &delegate, &token, b"x", key, "x").await;
        assert!(matches!(result, Err(CoreError::Authorization { code: "UPLOAD_NOT_ALLOWED", .. })));
    }

    #[tokio::test]
    async fn test_claim_rejects_realm_mismatch() {
        let (store, owner_idx, delegate) = setup();
        let key = NodeKey::from_bytes([9u8; 16]);
        let token = ActingToken { kind: TokenKind::Access, can_upload: true, realm: "realm-b".to_string() };
        let result = claim(&store, &owner_idx, &delegate, &token, b"x", key, "x").await;
        assert!(matches!(result, Err(CoreError::Authorization { code: "REALM_MISMATCH", .. })));
    }
}
