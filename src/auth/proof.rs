//! Scope / Proof Engine. Verifies that a delegate's reference
//! to an arbitrary node is backed by an index-path walk from one of its
//! scope roots, or from a depot's historical root it has management
//! access to.

use std::collections::HashMap;

use crate::codec::{empty_dnode_key, CasNode, NodeKey};
use crate::common::error::CoreError;
use crate::delegate::{Delegate, ScopeBinding};
use crate::depot::DepotRegistry;
use crate::ids::DepotId;
use crate::tree::{child_at, NodeStoreHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofWord {
    Ipath { scope_index: u32, path: Vec<usize> },
    Depot { depot_id: DepotId, version: u32, path: Vec<usize> },
}

impl ProofWord {
    /// Parse the wire grammar: `"ipath#<scopeIndex>[:<idx>…]"` or
    /// `"depot:<depotId>@<version>#<idx>[:<idx>…]"`.
    pub fn parse(word: &str) -> Result<Self, CoreError> {
        if let Some(rest) = word.strip_prefix("ipath#") {
            let mut parts = rest.split(':');
            let scope_index: u32 = parts
                .next()
                .ok_or_else(|| CoreError::validation("INVALID_PROOF_WORD", "missing scope index"))?
                .parse()
                .map_err(|_| CoreError::validation("INVALID_PROOF_WORD", "scope index must be a non-negative integer"))?;
            let path = parse_indices(parts)?;
            return Ok(ProofWord::Ipath { scope_index, path });
        }

        if let Some(rest) = word.strip_prefix("depot:") {
            let (head, path_part) = rest
                .split_once('#')
                .ok_or_else(|| CoreError::validation("INVALID_PROOF_WORD", "missing '#' path separator"))?;
            let (depot_text, version_text) = head
                .split_once('@')
                .ok_or_else(|| CoreError::validation("INVALID_PROOF_WORD", "missing '@version'"))?;
            let depot_id: DepotId = depot_text
                .parse()
                .map_err(|_: CoreError| CoreError::validation("INVALID_PROOF_WORD", "bad depot id"))?;
            let version: u32 = version_text
                .parse()
                .map_err(|_| CoreError::validation("INVALID_PROOF_WORD", "version must be a non-negative integer"))?;
            let path = parse_indices(path_part.split(':'))?;
            return Ok(ProofWord::Depot { depot_id, version, path });
        }

        Err(CoreError::validation("INVALID_PROOF_WORD", format!("unrecognized proof word '{word}'")))
    }
}

fn parse_indices<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<usize>, CoreError> {
    parts
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| CoreError::validation("INVALID_PROOF_WORD", format!("bad index '{s}'"))))
        .collect()
}

/// `{ "<nodeHashHex>": "<word>" }`, keyed by the lowercase hex encoding of
/// the target node's 16 raw bytes (distinct from the `nod_` Base32 text
/// form used elsewhere at the boundary — this is the proof header's own
/// wire convention).
pub type ProofMap = HashMap<String, ProofWord>;

pub fn node_hash_hex(key: &NodeKey) -> String {
    key.as_bytes().iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse the `X-CAS-Proof` header body. Absence of the header is
/// equivalent to an empty object, so callers should pass `"{}"` rather
/// than skip parsing.
pub fn parse_proof_header(raw: &str) -> Result<ProofMap, CoreError> {
    let raw_map: HashMap<String, String> =
        serde_json::from_str(raw).map_err(|_| CoreError::validation("INVALID_PROOF_FORMAT", "proof header is not a JSON object of strings"))?;

    raw_map
        .into_iter()
        .map(|(k, v)| ProofWord::parse(&v).map(|word| (k, word)))
        .collect()
}

/// Resolve a delegate's scope roots. An unscoped delegate has none. A
/// single-node scope is scope index 0. A set-node scope's roots are the
/// set-node's sorted children, scope index = position.
pub async fn resolve_scope_roots(store: &NodeStoreHandle, delegate: &Delegate) -> Result<Vec<NodeKey>, CoreError> {
    match &delegate.scope {
        None => Ok(vec![]),
        Some(ScopeBinding::Node(key)) => Ok(vec![*key]),
        Some(ScopeBinding::Set(set_key)) => match store.get(set_key).await? {
            CasNode::SetNode { children } => Ok(children),
            _ => Err(CoreError::internal("scope set binding does not point to a set-node")),
        },
    }
}

/// Verify one proof word against the claimed target node hash.
pub async fn verify_word(
    store: &NodeStoreHandle,
    depots: &DepotRegistry,
    delegate: &Delegate,
    target: NodeKey,
    word: &ProofWord,
) -> Result<(), CoreError> {
    if target == empty_dnode_key() {
        return Ok(());
    }

    let (mut current, path) = match word {
        ProofWord::Ipath { scope_index, path } => {
            let roots = resolve_scope_roots(store, delegate).await?;
            let root = roots
                .get(*scope_index as usize)
                .copied()
                .ok_or_else(|| CoreError::validation("SCOPE_ROOT_OUT_OF_BOUNDS", format!("scope index {scope_index}")))?;
            (root, path.clone())
        }
        ProofWord::Depot { depot_id, version, path } => {
            if !delegate.capabilities.can_manage_depot {
                return Err(CoreError::authorization("DEPOT_ACCESS_DENIED", "delegate lacks depot management access"));
            }
            let root = depots.resolve_version(&delegate.realm, depot_id, *version).await?;
            (root, path.clone())
        }
    };

    for index in &path {
        let node = store.get(&current).await.map_err(|e| match e {
            CoreError::NotFound { .. } => CoreError::not_found("NODE_NOT_FOUND", current.to_string()),
            other => other,
        })?;
        current = child_at(&node, *index)?;
    }

    if current == target {
        Ok(())
    } else {
        Err(CoreError::validation("PATH_MISMATCH", "index-path walk did not reach the claimed target"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_dict, encode_set, DirEntry};
    use crate::delegate::{new_root, Capabilities};
    use crate::ids::DelegateId;
    use crate::store::{MemoryCache, MemoryMetadataStore, MemoryNodeStore};
    use std::sync::Arc;

    fn store_handle() -> NodeStoreHandle {
        NodeStoreHandle::new(Arc::new(MemoryNodeStore::new()))
    }

    fn registry() -> DepotRegistry {
        DepotRegistry::new(Arc::new(MemoryMetadataStore::new()), Arc::new(MemoryCache::new()), 50)
    }

    fn unrestricted_delegate() -> Delegate {
        new_root(
            DelegateId::from_bytes([1u8; 16]),
            "realm-a",
            Capabilities { can_upload: true, can_manage_depot: true },
        )
    }

    #[test]
    fn test_parse_ipath_word() {
        let word = ProofWord::parse("ipath#2:0:3").unwrap();
        assert_eq!(word, ProofWord::Ipath { scope_index: 2, path: vec![0, 3] });
    }

    #[test]
    fn test_parse_depot_word() {
        let depot_id = DepotId::from_bytes([5u8; 16]);
        let text = format!("depot:{depot_id}@3#1:2");
        let word = ProofWord::parse(&text).unwrap();
        assert_eq!(word, ProofWord::Depot { depot_id, version: 3, path: vec![1, 2] });
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ProofWord::parse("nonsense").is_err());
    }

    #[tokio::test]
    async fn test_verify_ipath_against_single_node_scope() {
        let store = store_handle();
        let child_a = NodeKey::from_bytes([1u8; 16]);
        let child_b = NodeKey::from_bytes([2u8; 16]);
        let (bytes, _) = encode_set(vec![child_a, child_b]).unwrap();
        let key = crate::codec::derive_key(&bytes);
        store.put_bytes(key, bytes).await.unwrap();

        let mut delegate = unrestricted_delegate();
        delegate.scope = Some(ScopeBinding::Set(key));

        let word = ProofWord::Ipath { scope_index: 0, path: vec![] };
        let depots = registry();
        let result = verify_word(&store, &depots, &delegate, child_a, &word).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_verify_ipath_mismatch() {
        let store = store_handle();
        let entries = vec![DirEntry { name: "a".to_string(), child: NodeKey::from_bytes([1u8; 16]) }];
        let (bytes, key) = encode_dict(entries).unwrap();
        store.put_bytes(key, bytes).await.unwrap();

        let mut delegate = unrestricted_delegate();
        delegate.scope = Some(ScopeBinding::Node(key));

        let word = ProofWord::Ipath { scope_index: 0, path: vec![0] };
        let depots = registry();
        let wrong_target = NodeKey::from_bytes([99u8; 16]);
        let result = verify_word(&store, &depots, &delegate, wrong_target, &word).await;
        assert!(matches!(result, Err(CoreError::Validation { code: "PATH_MISMATCH", .. })));
    }

    #[tokio::test]
    async fn test_depot_proof_requires_management_access() {
        let store = store_handle();
        let depots = registry();
        let mut delegate = unrestricted_delegate();
        delegate.capabilities.can_manage_depot = false;

        let word = ProofWord::Depot { depot_id: DepotId::from_bytes([1u8; 16]), version: 0, path: vec![] };
        let target = NodeKey::from_bytes([1u8; 16]);
        let result = verify_word(&store, &depots, &delegate, target, &word).await;
        assert!(matches!(result, Err(CoreError::Authorization { code: "DEPOT_ACCESS_DENIED", .. })));
    }

    #[test]
    fn test_proof_header_roundtrip() {
        let key = NodeKey::from_bytes([7u8; 16]);
        let hex = node_hash_hex(&key);
        let raw = format!(r#"{{"{hex}": "ipath#0:1"}}"#);
        let map = parse_proof_header(&raw).unwrap();
        assert_eq!(map.get(&hex), Some(&ProofWord::Ipath { scope_index: 0, path: vec![1] }));
    }
}
