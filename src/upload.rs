//! Turns a computed B-Tree layout plus a file's bytes into the
//! actual CAS node graph: leaves and successors first, the f-node root
//! last, matching "Upload uses this layout to upload leaves first, then
//! parents, then root."
//!
//! This module is pure — it does not touch the node store. Callers (FS
//! Ops) persist the returned nodes via `onNodeStored`, which is also
//! where ownership and usage bookkeeping happen.

use crate::codec::{encode_file, encode_successor, CasNode, NodeKey, NodeKind};
use crate::common::error::CoreError;
use crate::topology::{compute_layout, LayoutNode};

/// A single CAS node produced while building a file's tree, annotated with
/// the metadata `onNodeStored` needs.
#[derive(Debug, Clone)]
pub struct StoredNode {
    pub key: NodeKey,
    pub bytes: Vec<u8>,
    pub kind: NodeKind,
    pub logical_size: u64,
}

/// The full result of building a file's node graph.
#[derive(Debug, Clone)]
pub struct FileTree {
    pub root: NodeKey,
    /// All nodes in leaves-first order — safe to persist/record sequentially.
    pub nodes: Vec<StoredNode>,
}

/// Build the complete CAS node graph for `data`, encoding the root as an
/// f-node carrying `content_type` and the true `fileSize`.
pub fn build_file_tree(data: &[u8], content_type: &str, node_limit: u32) -> Result<FileTree, CoreError> {
    let layout = compute_layout(data.len() as u64, node_limit)?;
    let mut nodes = Vec::new();
    let mut offset = 0usize;
    let (root_key, root_bytes) = build_node(&layout, data, &mut offset, content_type, true, &mut nodes)?;
    debug_assert_eq!(offset, data.len());
    nodes.push(StoredNode {
        key: root_key,
        bytes: root_bytes,
        kind: NodeKind::FNode,
        logical_size: data.len() as u64,
    });
    Ok(FileTree { root: root_key, nodes })
}

fn build_node(
    layout: &LayoutNode,
    data: &[u8],
    offset: &mut usize,
    content_type: &str,
    is_root: bool,
    out: &mut Vec<StoredNode>,
) -> Result<(NodeKey, Vec<u8>), CoreError> {
    let mut children = Vec::with_capacity(layout.children.len());
    for child_layout in &layout.children {
        let (child_key, child_bytes) = build_node(child_layout, data, offset, content_type, false, out)?;
        let logical_size = child_layout.total_size();
        out.push(StoredNode { key: child_key, bytes: child_bytes, kind: NodeKind::SNode, logical_size });
        children.push(child_key);
    }

    let own_data = data[*offset..*offset + layout.own_data_size as usize].to_vec();
    *offset += layout.own_data_size as usize;

    if is_root {
        encode_file(own_data, content_type.to_string(), data.len() as u64, children)
    } else {
        encode_successor(own_data, children)
    }
}

/// Read a file's bytes back out of a resolved root node, given a lookup
/// function for its descendants. Traverses data + children in declared
/// child order, matching the encode side.
pub fn read_file_data<E>(root: &CasNode, mut get_child: impl FnMut(&NodeKey) -> Result<CasNode, E>) -> Result<Vec<u8>, E>
where
    E: From<CoreError>,
{
    fn walk<E>(node: &CasNode, get_child: &mut impl FnMut(&NodeKey) -> Result<CasNode, E>, out: &mut Vec<u8>) -> Result<(), E>
    where
        E: From<CoreError>,
    {
        let (children, data) = match node {
            CasNode::FNode { children, data, .. } => (children, data),
            CasNode::SNode { children, data } => (children, data),
            _ => return Err(CoreError::type_mismatch("NOT_A_FILE", "node is not part of a file tree").into()),
        };
        for child_key in children {
            let child = get_child(child_key)?;
            walk(&child, get_child, out)?;
        }
        out.extend_from_slice(data);
        Ok(())
    }

    let mut out = Vec::new();
    walk(root, &mut get_child, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use std::collections::HashMap;

    fn roundtrip(data: &[u8], node_limit: u32) -> Vec<u8> {
        let tree = build_file_tree(data, "application/octet-stream", node_limit).unwrap();
        let mut store: HashMap<NodeKey, Vec<u8>> = HashMap::new();
        for n in &tree.nodes {
            store.insert(n.key, n.bytes.clone());
        }
        let root = decode(store.get(&tree.root).unwrap()).unwrap();
        read_file_data::<CoreError>(&root, |k| decode(store.get(k).unwrap())).unwrap()
    }

    #[test]
    fn test_small_file_is_single_node() {
        let data = b"hello world".to_vec();
        let tree = build_file_tree(&data, "text/plain", 1024).unwrap();
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].kind, NodeKind::FNode);
    }

    #[test]
    fn test_large_file_builds_multi_level_tree() {
        let data = vec![7u8; 50_000];
        let tree = build_file_tree(&data, "application/octet-stream", 1024).unwrap();
        assert!(tree.nodes.len() > 1);
        assert_eq!(tree.nodes.last().unwrap().kind, NodeKind::FNode);
    }

    #[test]
    fn test_roundtrip_small() {
        let data = b"round and round".to_vec();
        assert_eq!(roundtrip(&data, 1024), data);
    }

    #[test]
    fn test_roundtrip_large() {
        let data: Vec<u8> = (0..80_000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(roundtrip(&data, 1024), data);
    }

    #[test]
    fn test_roundtrip_empty() {
        let data: Vec<u8> = vec![];
        assert_eq!(roundtrip(&data, 1024), data);
    }
}
