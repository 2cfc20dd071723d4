//! Tree Operations (immutable). Every operation returns a new
//! root key; previously observed roots remain fully navigable because
//! nothing already in the node store is ever mutated, only superseded.
//!
//! `NodeStoreHandle` is the thin decode/encode wrapper every higher layer
//! (FS ops, auth) uses to talk to a `NodeStore` in terms of `CasNode`
//! values instead of raw bytes.

use std::sync::Arc;

use crate::codec::{decode, empty_dnode_bytes, empty_dnode_key, encode_dict, CasNode, DirEntry, NodeKey};
use crate::common::error::CoreError;
use crate::store::{NodeStore, StoreError};

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PreconditionFailed(k) => CoreError::conflict("STORE_PRECONDITION_FAILED", k),
            StoreError::KeyMismatch { computed, supplied } => CoreError::validation(
                "FAIL_KEY_MISMATCH",
                format!("computed {computed} but caller supplied {supplied}"),
            ),
            StoreError::NotFound(k) => CoreError::not_found("NODE_NOT_FOUND", k),
            StoreError::Timeout(m) => CoreError::internal(format!("store timeout: {m}")),
            StoreError::Backend(m) => CoreError::internal(format!("store backend error: {m}")),
        }
    }
}

/// Decode/encode wrapper in front of a raw `NodeStore`.
#[derive(Clone)]
pub struct NodeStoreHandle {
    inner: Arc<dyn NodeStore>,
}

impl NodeStoreHandle {
    pub fn new(inner: Arc<dyn NodeStore>) -> Self {
        Self { inner }
    }

    pub async fn get(&self, key: &NodeKey) -> Result<CasNode, CoreError> {
        let bytes = self
            .inner
            .get(key)
            .await?
            .ok_or_else(|| CoreError::not_found("NODE_NOT_FOUND", key.to_string()))?;
        decode(&bytes)
    }

    pub async fn put_bytes(&self, key: NodeKey, bytes: Vec<u8>) -> Result<(), CoreError> {
        Ok(self.inner.put(key, bytes).await?)
    }

    pub async fn get_bytes(&self, key: &NodeKey) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self.inner.get(key).await?)
    }

    pub async fn has(&self, key: &NodeKey) -> Result<bool, CoreError> {
        Ok(self.inner.has(key).await?)
    }

    /// Encode and store a d-node, returning its key.
    pub async fn put_dnode(&self, entries: Vec<DirEntry>) -> Result<NodeKey, CoreError> {
        let (bytes, key) = encode_dict(entries)?;
        self.put_bytes(key, bytes).await?;
        Ok(key)
    }
}

/// A single path/index-path step resolved against a directory.
#[derive(Debug, Clone)]
pub struct PathStep {
    pub name: String,
    pub index: usize,
}

/// Result of `resolve_path`.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub key: NodeKey,
    pub node: CasNode,
    pub name: String,
    /// Ancestor directory nodes from root to (excluding) the resolved
    /// node's parent, each paired with the step that led out of it.
    pub parent_path: Vec<(NodeKey, CasNode, PathStep)>,
}

#[derive(Debug, Clone)]
pub enum Segments {
    Names(Vec<String>),
    Indices(Vec<usize>),
}

fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name == ".." || name == "." {
        return Err(CoreError::validation("INVALID_PATH", format!("invalid path segment '{name}'")));
    }
    Ok(())
}

/// Parse a `/`-separated path into validated segments. Rejects absolute
/// paths, empty segments, and `..`.
pub fn parse_path(path: &str) -> Result<Vec<String>, CoreError> {
    if path.is_empty() {
        return Ok(vec![]);
    }
    if path.starts_with('/') {
        return Err(CoreError::validation("INVALID_PATH", "path must not be absolute"));
    }
    let segments: Vec<String> = path.split('/').map(|s| s.to_string()).collect();
    for s in &segments {
        validate_name(s)?;
    }
    Ok(segments)
}

/// Parse a `:`-separated index path into indices.
pub fn parse_index_path(index_path: &str) -> Result<Vec<usize>, CoreError> {
    if index_path.is_empty() {
        return Ok(vec![]);
    }
    index_path
        .split(':')
        .map(|s| s.parse::<usize>().map_err(|_| CoreError::validation("INVALID_PATH", format!("bad index '{s}'"))))
        .collect()
}

/// Resolve a path or index path from `root` down to the target node.
pub async fn resolve_path(
    store: &NodeStoreHandle,
    root: NodeKey,
    segments: &Segments,
) -> Result<Resolved, CoreError> {
    let root_node = store.get(&root).await?;

    let is_empty = match segments {
        Segments::Names(v) => v.is_empty(),
        Segments::Indices(v) => v.is_empty(),
    };
    if is_empty {
        return Ok(Resolved { key: root, node: root_node, name: String::new(), parent_path: vec![] });
    }

    let mut current_key = root;
    let mut current_node = root_node;
    let mut parent_path = Vec::new();
    let mut last_name = String::new();

    let len = match segments {
        Segments::Names(v) => v.len(),
        Segments::Indices(v) => v.len(),
    };

    for i in 0..len {
        let entries = match &current_node {
            CasNode::DNode { entries } => entries,
            _ => return Err(CoreError::type_mismatch("NOT_A_DIRECTORY", "path crosses a non-directory node")),
        };

        let (index, name) = match segments {
            Segments::Names(names) => {
                let name = &names[i];
                let idx = entries
                    .iter()
                    .position(|e| &e.name == name)
                    .ok_or_else(|| CoreError::not_found("PATH_NOT_FOUND", name.clone()))?;
                (idx, name.clone())
            }
            Segments::Indices(indices) => {
                let idx = indices[i];
                if idx >= entries.len() {
                    return Err(CoreError::validation("INDEX_OUT_OF_BOUNDS", format!("index {idx} out of bounds")));
                }
                (idx, entries[idx].name.clone())
            }
        };

        let step = PathStep { name: name.clone(), index };
        parent_path.push((current_key, current_node.clone(), step));

        let child_key = entries[index].child;
        current_node = store.get(&child_key).await?;
        current_key = child_key;
        last_name = name;
    }

    Ok(Resolved { key: current_key, node: current_node, name: last_name, parent_path })
}

/// Re-encode each ancestor d-node from bottom to root with the updated
/// child key, returning the new root key. `parent_path` is ordered root
/// first, as produced by `resolve_path`.
pub async fn rebuild_merkle_path(
    store: &NodeStoreHandle,
    parent_path: &[(NodeKey, CasNode, PathStep)],
    new_leaf_key: NodeKey,
) -> Result<NodeKey, CoreError> {
    let mut child_key = new_leaf_key;
    for (_, node, step) in parent_path.iter().rev() {
        let entries = match node {
            CasNode::DNode { entries } => entries.clone(),
            _ => return Err(CoreError::internal("rebuild_merkle_path: ancestor is not a directory")),
        };
        let mut entries = entries;
        entries[step.index].child = child_key;
        child_key = store.put_dnode(entries).await?;
    }
    Ok(child_key)
}

/// Insert a new entry into a directory node, maintaining sort order. Fails
/// if the name already exists.
pub fn insert_child(dir_entries: &[DirEntry], name: &str, new_child: NodeKey) -> Result<Vec<DirEntry>, CoreError> {
    if dir_entries.iter().any(|e| e.name == name) {
        return Err(CoreError::conflict("EXISTS", format!("entry '{name}' already exists")));
    }
    let mut entries = dir_entries.to_vec();
    entries.push(DirEntry { name: name.to_string(), child: new_child });
    entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
    Ok(entries)
}

/// Replace an existing entry's child key in place (used by `write` when
/// overwriting an existing file).
pub fn replace_child(dir_entries: &[DirEntry], name: &str, new_child: NodeKey) -> Result<Vec<DirEntry>, CoreError> {
    let mut entries = dir_entries.to_vec();
    let slot = entries
        .iter_mut()
        .find(|e| e.name == name)
        .ok_or_else(|| CoreError::not_found("PATH_NOT_FOUND", name.to_string()))?;
    slot.child = new_child;
    Ok(entries)
}

/// Remove an entry from a directory node by index.
pub fn remove_child(dir_entries: &[DirEntry], index: usize) -> Result<Vec<DirEntry>, CoreError> {
    if index >= dir_entries.len() {
        return Err(CoreError::validation("INDEX_OUT_OF_BOUNDS", format!("index {index} out of bounds")));
    }
    let mut entries = dir_entries.to_vec();
    entries.remove(index);
    Ok(entries)
}

/// Generic child-at-index lookup across any node kind that carries
/// children — used by the Scope/Proof Engine's index-path walks, which
/// are not restricted to directories the way `resolve_path` is.
pub fn child_at(node: &CasNode, index: usize) -> Result<NodeKey, CoreError> {
    let children: &[NodeKey] = match node {
        CasNode::FNode { children, .. } => children,
        CasNode::SNode { children, .. } => children,
        CasNode::SetNode { children } => children,
        CasNode::DNode { entries } => {
            return entries
                .get(index)
                .map(|e| e.child)
                .ok_or_else(|| CoreError::validation("CHILD_INDEX_OUT_OF_BOUNDS", format!("index {index} out of bounds")));
        }
    };
    children
        .get(index)
        .copied()
        .ok_or_else(|| CoreError::validation("CHILD_INDEX_OUT_OF_BOUNDS", format!("index {index} out of bounds")))
}

/// Context returned by `ensure_parent_dirs`: the (possibly new) root, the
/// final parent directory's key/node, and the ancestor chain leading to it
/// (root first), so a caller can immediately call `insert_child` followed
/// by `rebuild_merkle_path`.
pub struct ParentContext {
    pub root: NodeKey,
    pub parent_key: NodeKey,
    pub parent_entries: Vec<DirEntry>,
    pub parent_path: Vec<(NodeKey, CasNode, PathStep)>,
}

/// Create any missing intermediate directories along `segments`, using the
/// well-known empty d-node for newly created directories. Each iteration
/// walks `segments` positionally (by index, not by re-deriving a depth from
/// a matched name) so a repeated segment name (e.g. `a/b/a/c`) cannot be
/// confused for an earlier occurrence; it stops at the first index whose
/// name is absent from its containing directory, creates that one missing
/// directory, rebuilds the Merkle path up to the root, and loops to resume
/// the walk from where it broke off.
pub async fn ensure_parent_dirs(
    store: &NodeStoreHandle,
    root: NodeKey,
    segments: &[String],
) -> Result<ParentContext, CoreError> {
    let mut current_root = root;

    loop {
        let mut key = current_root;
        let mut node = store.get(&key).await?;
        let mut parent_path: Vec<(NodeKey, CasNode, PathStep)> = Vec::new();
        let mut break_depth: Option<usize> = None;

        for (i, name) in segments.iter().enumerate() {
            let entries = match &node {
                CasNode::DNode { entries } => entries,
                _ => return Err(CoreError::type_mismatch("NOT_A_DIRECTORY", "intermediate segment is not a directory")),
            };

            match entries.iter().position(|e| &e.name == name) {
                Some(index) => {
                    let step = PathStep { name: name.clone(), index };
                    parent_path.push((key, node.clone(), step));
                    let child_key = entries[index].child;
                    key = child_key;
                    node = store.get(&child_key).await?;
                }
                None => {
                    break_depth = Some(i);
                    break;
                }
            }
        }

        let Some(depth) = break_depth else {
            let parent_entries = match &node {
                CasNode::DNode { entries } => entries.clone(),
                _ => return Err(CoreError::type_mismatch("NOT_A_DIRECTORY", "final parent is not a directory")),
            };
            return Ok(ParentContext { root: current_root, parent_key: key, parent_entries, parent_path });
        };

        let missing_name = &segments[depth];
        let parent_entries = match &node {
            CasNode::DNode { entries } => entries.clone(),
            _ => return Err(CoreError::type_mismatch("NOT_A_DIRECTORY", "intermediate segment is not a directory")),
        };

        let new_dir_key = empty_dnode_key();
        store.put_bytes(new_dir_key, empty_dnode_bytes()).await?;

        let updated_entries = insert_child(&parent_entries, missing_name, new_dir_key)?;
        let updated_parent_key = store.put_dnode(updated_entries).await?;

        current_root = if parent_path.is_empty() {
            updated_parent_key
        } else {
            rebuild_merkle_path(store, &parent_path, updated_parent_key).await?
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_file;
    use crate::store::MemoryNodeStore;

    fn handle() -> NodeStoreHandle {
        NodeStoreHandle::new(Arc::new(MemoryNodeStore::new()))
    }

    async fn put_file(store: &NodeStoreHandle, data: &[u8]) -> NodeKey {
        let (bytes, key) = encode_file(data.to_vec(), "text/plain".to_string(), data.len() as u64, vec![]).unwrap();
        store.put_bytes(key, bytes).await.unwrap();
        key
    }

    #[tokio::test]
    async fn test_resolve_root_with_no_segments() {
        let store = handle();
        let root = empty_dnode_key();
        store.put_bytes(root, empty_dnode_bytes()).await.unwrap();
        let resolved = resolve_path(&store, root, &Segments::Names(vec![])).await.unwrap();
        assert_eq!(resolved.key, root);
    }

    #[tokio::test]
    async fn test_resolve_path_not_found() {
        let store = handle();
        let root = empty_dnode_key();
        store.put_bytes(root, empty_dnode_bytes()).await.unwrap();
        let result = resolve_path(&store, root, &Segments::Names(vec!["missing".to_string()])).await;
        assert!(matches!(result, Err(CoreError::NotFound { code: "PATH_NOT_FOUND", .. })));
    }

    #[tokio::test]
    async fn test_insert_then_resolve() {
        let store = handle();
        let file_key = put_file(&store, b"hello").await;
        let entries = insert_child(&[], "a.txt", file_key).unwrap();
        let root = store.put_dnode(entries).await.unwrap();

        let resolved = resolve_path(&store, root, &Segments::Names(vec!["a.txt".to_string()])).await.unwrap();
        assert_eq!(resolved.key, file_key);
    }

    #[tokio::test]
    async fn test_insert_duplicate_name_fails() {
        let store = handle();
        let file_key = put_file(&store, b"hello").await;
        let entries = insert_child(&[], "a.txt", file_key).unwrap();
        let result = insert_child(&entries, "a.txt", file_key);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rebuild_merkle_path_updates_ancestors() {
        let store = handle();
        let old_file = put_file(&store, b"old").await;
        let new_file = put_file(&store, b"new").await;

        let leaf_entries = insert_child(&[], "leaf.txt", old_file).unwrap();
        let leaf_dir = store.put_dnode(leaf_entries.clone()).await.unwrap();
        let root_entries = insert_child(&[], "sub", leaf_dir).unwrap();
        let root = store.put_dnode(root_entries).await.unwrap();

        let resolved = resolve_path(
            &store,
            root,
            &Segments::Names(vec!["sub".to_string(), "leaf.txt".to_string()]),
        )
        .await
        .unwrap();

        let new_root = rebuild_merkle_path(&store, &resolved.parent_path, new_file).await.unwrap();
        assert_ne!(new_root, root);

        let resolved_after = resolve_path(
            &store,
            new_root,
            &Segments::Names(vec!["sub".to_string(), "leaf.txt".to_string()]),
        )
        .await
        .unwrap();
        assert_eq!(resolved_after.key, new_file);

        // the original root is still fully navigable
        let resolved_original = resolve_path(
            &store,
            root,
            &Segments::Names(vec!["sub".to_string(), "leaf.txt".to_string()]),
        )
        .await
        .unwrap();
        assert_eq!(resolved_original.key, old_file);
    }

    #[tokio::test]
    async fn test_ensure_parent_dirs_creates_missing_segments() {
        let store = handle();
        let root = empty_dnode_key();
        store.put_bytes(root, empty_dnode_bytes()).await.unwrap();

        let ctx = ensure_parent_dirs(&store, root, &["a".to_string(), "b".to_string()]).await.unwrap();
        assert!(ctx.parent_entries.is_empty());
        assert_ne!(ctx.root, root);

        let resolved =
            resolve_path(&store, ctx.root, &Segments::Names(vec!["a".to_string(), "b".to_string()])).await.unwrap();
        assert!(matches!(resolved.node, CasNode::DNode { .. }));
    }

    #[tokio::test]
    async fn test_ensure_parent_dirs_handles_repeated_segment_name() {
        let store = handle();
        let root = empty_dnode_key();
        store.put_bytes(root, empty_dnode_bytes()).await.unwrap();

        let segments = ["x".to_string(), "y".to_string(), "x".to_string(), "z".to_string()];
        let ctx = ensure_parent_dirs(&store, root, &segments).await.unwrap();
        assert!(ctx.parent_entries.is_empty());

        let resolved = resolve_path(&store, ctx.root, &Segments::Names(segments.to_vec())).await.unwrap();
        assert!(matches!(resolved.node, CasNode::DNode { .. }));

        // each intermediate level, including the repeated "x" name nested
        // under "y", was created as its own empty directory.
        let resolved_inner_x =
            resolve_path(&store, ctx.root, &Segments::Names(vec!["x".to_string(), "y".to_string(), "x".to_string()]))
                .await
                .unwrap();
        assert!(matches!(resolved_inner_x.node, CasNode::DNode { entries } if entries.len() == 1));
    }
}
