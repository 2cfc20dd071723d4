//! Filesystem Operations. Each operation takes `(realm,
//! actingDelegate, rootKey, ..)` and returns a new root key plus mutation
//! details, or an error; nothing already reachable from an older root is
//! ever mutated, only superseded (its immutability invariant carries
//! through every op here).
//!
//! `onNodeStored` (spec's bookkeeping hook) is `FsOps::persist_tree`: every
//! newly encoded node from a write is persisted and then recorded against
//! the acting delegate's full chain in the Ownership Index, mirroring the
//! teacher's service methods that fan out into storage plus bookkeeping
//! right after a mutation (`deposit_tracker/service.rs`'s post-register
//! hooks).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::auth::gate::authorize_link;
use crate::auth::proof::ProofMap;
use crate::codec::{empty_dnode_key, CasNode, DirEntry, NodeKey, NodeKind};
use crate::common::error::CoreError;
use crate::delegate::Delegate;
use crate::depot::DepotRegistry;
use crate::ownership::OwnershipIndex;
use crate::tree::{
    ensure_parent_dirs, insert_child, parse_index_path, parse_path, rebuild_merkle_path, remove_child, replace_child,
    resolve_path, NodeStoreHandle, PathStep, Resolved, Segments,
};
use crate::upload::build_file_tree;

/// Single-block fast path ceiling — bytes larger than this must go through
/// the multi-node B-Tree layout via a different entry point than a plain
/// `write`.
pub const FILE_MAX_SINGLE_BLOCK: usize = 4 * 1024 * 1024;

pub struct WriteOutcome {
    pub new_root: NodeKey,
    pub created: bool,
}

pub struct RemovedInfo {
    pub kind: NodeKind,
    pub key: NodeKey,
}

pub enum StatResult {
    File { size: u64, content_type: String },
    Dir { child_count: usize },
}

/// One entry of a `rewrite` batch's declarative spec map.
#[derive(Debug, Clone)]
pub enum RewriteSpec {
    /// Re-use the node found at `from_path` in the *original* root.
    From(String),
    /// Create an empty directory at the target.
    Dir,
    /// Reference an arbitrary node by key, subject to link authorization.
    Link(NodeKey),
}

/// `rm`/`mv` reject operating on the bare root — a named Conflict code per
/// operation, distinct from the generic `INVALID_PATH` used elsewhere.
fn ensure_not_root(segments: &[String], code: &'static str) -> Result<(), CoreError> {
    if segments.is_empty() {
        Err(CoreError::conflict(code, "operation on the bare root is disallowed"))
    } else {
        Ok(())
    }
}

/// Re-encode `entries` as the new value of a directory, then bubble the
/// change up through `ancestor_path` (root-first, NOT including the
/// directory whose entries were just changed) to produce a new root.
async fn splice_and_rebuild(
    store: &NodeStoreHandle,
    entries: Vec<DirEntry>,
    ancestor_path: &[(NodeKey, CasNode, PathStep)],
) -> Result<NodeKey, CoreError> {
    let new_key = store.put_dnode(entries).await?;
    if ancestor_path.is_empty() {
        Ok(new_key)
    } else {
        rebuild_merkle_path(store, ancestor_path, new_key).await
    }
}

/// Split a resolved node's ancestor chain into "the immediate parent's
/// current entries" and "everything above that parent", so callers that
/// need to mutate the immediate parent directly (rm, replace-at-index) can
/// do so and then bubble the change up with `splice_and_rebuild`.
fn split_immediate_parent(
    resolved: &Resolved,
) -> Result<(Vec<DirEntry>, usize, &[(NodeKey, CasNode, PathStep)]), CoreError> {
    let (ancestors, immediate) = resolved
        .parent_path
        .split_at(resolved.parent_path.len().saturating_sub(1));
    let (_, node, step) = immediate
        .first()
        .ok_or_else(|| CoreError::conflict("CANNOT_REMOVE_ROOT", "target has no parent"))?;
    let entries = match node {
        CasNode::DNode { entries } => entries.clone(),
        _ => return Err(CoreError::type_mismatch("NOT_A_DIRECTORY", "parent is not a directory")),
    };
    Ok((entries, step.index, ancestors))
}

fn read_data_boxed<'a>(
    store: &'a NodeStoreHandle,
    node: CasNode,
) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, CoreError>> + Send + 'a>> {
    Box::pin(async move {
        let (children, data) = match &node {
            CasNode::FNode { children, data, .. } => (children.clone(), data.clone()),
            CasNode::SNode { children, data } => (children.clone(), data.clone()),
            _ => return Err(CoreError::type_mismatch("NOT_A_FILE", "node is not part of a file tree")),
        };
        let mut out = Vec::new();
        for child_key in &children {
            let child_node = store.get(child_key).await?;
            out.extend(read_data_boxed(store, child_node).await?);
        }
        out.extend(data);
        Ok(out)
    })
}

/// Filesystem Operations. Holds the collaborators every op
/// needs: the node store (for reads/writes of the tree itself), the
/// ownership index (the `onNodeStored` bookkeeping hook), the depot
/// registry and acting delegate's proof context (link authorization in
/// `rewrite`), and the configured per-node and per-batch limits.
pub struct FsOps {
    store: NodeStoreHandle,
    ownership: Arc<OwnershipIndex>,
    depots: Arc<DepotRegistry>,
    node_limit: u32,
    max_rewrite_entries: usize,
}

impl FsOps {
    pub fn new(
        store: NodeStoreHandle,
        ownership: Arc<OwnershipIndex>,
        depots: Arc<DepotRegistry>,
        node_limit: u32,
        max_rewrite_entries: usize,
    ) -> Self {
        Self { store, ownership, depots, node_limit, max_rewrite_entries }
    }

    /// `onNodeStored`: persist every node from a freshly built file tree and
    /// record full-chain ownership for the acting delegate. Idempotent —
    /// re-uploading an already-stored key is a no-op at the byte level
    /// (`NodeStore::put` idempotency) but still records ownership for this
    /// chain.
    async fn persist_tree(
        &self,
        tree: &crate::upload::FileTree,
        content_type: &str,
        delegate: &Delegate,
    ) -> Result<(), CoreError> {
        for node in &tree.nodes {
            self.store.put_bytes(node.key, node.bytes.clone()).await?;
            let kind = match node.kind {
                NodeKind::FNode => "file",
                NodeKind::SNode => "file_chunk",
                NodeKind::DNode => "dir",
                NodeKind::SetNode => "set",
            };
            self.ownership
                .add_ownership(node.key, &delegate.chain, delegate.delegate_id, content_type, node.logical_size, kind)
                .await?;
        }
        Ok(())
    }

    /// `write(path | indexPath, bytes, contentType)`.
    pub async fn write(
        &self,
        root: NodeKey,
        target: &Segments,
        bytes: Vec<u8>,
        content_type: &str,
        delegate: &Delegate,
    ) -> Result<WriteOutcome, CoreError> {
        if bytes.len() > FILE_MAX_SINGLE_BLOCK {
            return Err(CoreError::validation(
                "FILE_TOO_LARGE",
                format!("{} bytes exceeds the {FILE_MAX_SINGLE_BLOCK}-byte single-block limit", bytes.len()),
            ));
        }

        let tree = build_file_tree(&bytes, content_type, self.node_limit)?;

        match target {
            Segments::Names(segments) => {
                if segments.is_empty() {
                    return Err(CoreError::validation("INVALID_PATH", "cannot write to the bare root"));
                }
                let (parent_segments, leaf) = segments.split_at(segments.len() - 1);
                let leaf_name = &leaf[0];

                let ctx = ensure_parent_dirs(&self.store, root, parent_segments).await?;
                let existing = ctx.parent_entries.iter().find(|e| &e.name == leaf_name);

                let created = match existing {
                    Some(entry) => {
                        let existing_node = self.store.get(&entry.child).await?;
                        if existing_node.is_dir() {
                            return Err(CoreError::type_mismatch("NOT_A_FILE", format!("'{leaf_name}' is a directory")));
                        }
                        false
                    }
                    None => true,
                };

                self.persist_tree(&tree, content_type, delegate).await?;

                let new_entries = if created {
                    insert_child(&ctx.parent_entries, leaf_name, tree.root)?
                } else {
                    replace_child(&ctx.parent_entries, leaf_name, tree.root)?
                };
                let new_parent_key = self.store.put_dnode(new_entries).await?;
                let new_root = if ctx.parent_path.is_empty() {
                    new_parent_key
                } else {
                    rebuild_merkle_path(&self.store, &ctx.parent_path, new_parent_key).await?
                };

                Ok(WriteOutcome { new_root, created })
            }
            Segments::Indices(indices) => {
                if indices.is_empty() {
                    return Err(CoreError::validation("INVALID_PATH", "cannot write to the bare root via an index path"));
                }
                let (parent_indices, leaf) = indices.split_at(indices.len() - 1);
                let leaf_index = leaf[0];

                let resolved_parent = resolve_path(&self.store, root, &Segments::Indices(parent_indices.to_vec())).await?;
                let mut parent_entries = match &resolved_parent.node {
                    CasNode::DNode { entries } => entries.clone(),
                    _ => return Err(CoreError::type_mismatch("NOT_A_DIRECTORY", "parent is not a directory")),
                };
                if leaf_index >= parent_entries.len() {
                    return Err(CoreError::validation("INDEX_OUT_OF_BOUNDS", format!("index {leaf_index} out of bounds")));
                }

                let existing_node = self.store.get(&parent_entries[leaf_index].child).await?;
                if existing_node.is_dir() {
                    return Err(CoreError::type_mismatch("NOT_A_FILE", "indexed entry is a directory"));
                }

                self.persist_tree(&tree, content_type, delegate).await?;
                parent_entries[leaf_index].child = tree.root;

                let new_parent_key = self.store.put_dnode(parent_entries).await?;
                let new_root = if resolved_parent.parent_path.is_empty() {
                    new_parent_key
                } else {
                    rebuild_merkle_path(&self.store, &resolved_parent.parent_path, new_parent_key).await?
                };

                Ok(WriteOutcome { new_root, created: false })
            }
        }
    }

    /// `mkdir(path)` — idempotent; mkdir-p for missing intermediate
    /// segments, matching `write`'s parent creation.
    pub async fn mkdir(&self, root: NodeKey, path: &str) -> Result<(NodeKey, bool), CoreError> {
        let segments = parse_path(path)?;
        if segments.is_empty() {
            return Ok((root, false));
        }
        let (parent_segments, leaf) = segments.split_at(segments.len() - 1);
        let leaf_name = &leaf[0];

        let ctx = ensure_parent_dirs(&self.store, root, parent_segments).await?;
        if let Some(entry) = ctx.parent_entries.iter().find(|e| &e.name == leaf_name) {
            let existing_node = self.store.get(&entry.child).await?;
            return if existing_node.is_dir() {
                Ok((ctx.root, false))
            } else {
                Err(CoreError::conflict("EXISTS_AS_FILE", format!("'{leaf_name}' exists as a file")))
            };
        }

        let empty_dir = empty_dnode_key();
        self.store.put_bytes(empty_dir, crate::codec::empty_dnode_bytes()).await?;
        let new_entries = insert_child(&ctx.parent_entries, leaf_name, empty_dir)?;
        let new_root = splice_and_rebuild(&self.store, new_entries, &ctx.parent_path).await?;
        Ok((new_root, true))
    }

    /// `rm(path | indexPath)`. Root removal disallowed.
    pub async fn rm(&self, root: NodeKey, target: &Segments) -> Result<(NodeKey, RemovedInfo), CoreError> {
        let is_empty = match target {
            Segments::Names(v) => v.is_empty(),
            Segments::Indices(v) => v.is_empty(),
        };
        if is_empty {
            return Err(CoreError::conflict("CANNOT_REMOVE_ROOT", "root removal disallowed"));
        }

        let resolved = resolve_path(&self.store, root, target).await?;
        let removed_kind = resolved.node.kind();
        let removed_key = resolved.key;

        let (entries, index, ancestors) = split_immediate_parent(&resolved)?;
        let new_entries = remove_child(&entries, index)?;
        let new_root = splice_and_rebuild(&self.store, new_entries, ancestors).await?;

        Ok((new_root, RemovedInfo { kind: removed_kind, key: removed_key }))
    }

    /// `mv(from, to)`. delete `from`, insert at `to`, each
    /// against the intermediate new root.
    pub async fn mv(&self, root: NodeKey, from: &str, to: &str) -> Result<NodeKey, CoreError> {
        let from_segments = parse_path(from)?;
        let to_segments = parse_path(to)?;

        ensure_not_root(&from_segments, "CANNOT_MOVE_ROOT")?;

        if to_segments.len() > from_segments.len() && to_segments[..from_segments.len()] == from_segments[..] {
            return Err(CoreError::conflict("MOVE_INTO_SELF", "destination is within the source directory"));
        }

        let resolved_from = resolve_path(&self.store, root, &Segments::Names(from_segments.clone())).await?;
        let source_key = resolved_from.key;
        let source_is_dir = resolved_from.node.is_dir();

        let to_probe = resolve_path(&self.store, root, &Segments::Names(to_segments.clone())).await;
        let effective_to_segments = match to_probe {
            Ok(resolved_to) => {
                if resolved_to.node.is_dir() && !source_is_dir {
                    let mut segs = to_segments.clone();
                    segs.push(resolved_from.name.clone());
                    segs
                } else {
                    return Err(CoreError::conflict("TARGET_EXISTS", format!("'{to}' already exists")));
                }
            }
            Err(CoreError::NotFound { code: "PATH_NOT_FOUND", .. }) => to_segments.clone(),
            Err(e) => return Err(e),
        };

        let (entries, index, ancestors) = split_immediate_parent(&resolved_from)?;
        let new_entries = remove_child(&entries, index)?;
        let root_after_delete = splice_and_rebuild(&self.store, new_entries, ancestors).await?;

        let (parent_segments, leaf) = effective_to_segments.split_at(effective_to_segments.len() - 1);
        let leaf_name = &leaf[0];
        let ctx = ensure_parent_dirs(&self.store, root_after_delete, parent_segments).await?;
        if ctx.parent_entries.iter().any(|e| &e.name == leaf_name) {
            return Err(CoreError::conflict("TARGET_EXISTS", format!("'{leaf_name}' already exists at destination")));
        }
        let new_entries = insert_child(&ctx.parent_entries, leaf_name, source_key)?;
        splice_and_rebuild(&self.store, new_entries, &ctx.parent_path).await
    }

    /// `cp(from, to)` — shallow copy by re-using the content hash; CAS
    /// dedup means no data is actually duplicated.
    pub async fn cp(&self, root: NodeKey, from: &str, to: &str) -> Result<NodeKey, CoreError> {
        let from_segments = parse_path(from)?;
        let to_segments = parse_path(to)?;

        let resolved_from = resolve_path(&self.store, root, &Segments::Names(from_segments)).await?;
        let source_key = resolved_from.key;

        let to_probe = resolve_path(&self.store, root, &Segments::Names(to_segments.clone())).await;
        let effective_to_segments = match to_probe {
            Ok(resolved_to) => {
                if resolved_to.node.is_dir() && !resolved_from.node.is_dir() {
                    let mut segs = to_segments.clone();
                    segs.push(resolved_from.name.clone());
                    segs
                } else {
                    return Err(CoreError::conflict("TARGET_EXISTS", format!("'{to}' already exists")));
                }
            }
            Err(CoreError::NotFound { code: "PATH_NOT_FOUND", .. }) => to_segments,
            Err(e) => return Err(e),
        };

        if effective_to_segments.is_empty() {
            return Err(CoreError::validation("INVALID_PATH", "cannot copy onto the bare root"));
        }
        let (parent_segments, leaf) = effective_to_segments.split_at(effective_to_segments.len() - 1);
        let leaf_name = &leaf[0];
        let ctx = ensure_parent_dirs(&self.store, root, parent_segments).await?;
        if ctx.parent_entries.iter().any(|e| &e.name == leaf_name) {
            return Err(CoreError::conflict("TARGET_EXISTS", format!("'{leaf_name}' already exists at destination")));
        }
        let new_entries = insert_child(&ctx.parent_entries, leaf_name, source_key)?;
        splice_and_rebuild(&self.store, new_entries, &ctx.parent_path).await
    }

    /// `rewrite(entries, deletes)` — declarative batch. Deletes apply first
    /// against a rolling root; entries apply next, with `{from}` resolved
    /// against the *original* (pre-delete) root so move/duplicate works in
    /// one call.
    pub async fn rewrite(
        &self,
        root: NodeKey,
        entries: &std::collections::HashMap<String, RewriteSpec>,
        deletes: &[String],
        delegate: &Delegate,
        proof: &ProofMap,
    ) -> Result<NodeKey, CoreError> {
        if entries.is_empty() && deletes.is_empty() {
            return Err(CoreError::validation("EMPTY_REWRITE", "rewrite requires at least one entry or delete"));
        }
        if entries.len() + deletes.len() > self.max_rewrite_entries {
            return Err(CoreError::validation(
                "TOO_MANY_ENTRIES",
                format!("{} entries exceeds the {} limit", entries.len() + deletes.len(), self.max_rewrite_entries),
            ));
        }

        let original_root = root;
        let mut rolling_root = root;

        for path in deletes {
            let segments = parse_path(path)?;
            if segments.is_empty() {
                continue;
            }
            match resolve_path(&self.store, rolling_root, &Segments::Names(segments)).await {
                Ok(resolved) => {
                    let (entries, index, ancestors) = split_immediate_parent(&resolved)?;
                    let new_entries = remove_child(&entries, index)?;
                    rolling_root = splice_and_rebuild(&self.store, new_entries, ancestors).await?;
                }
                Err(CoreError::NotFound { code: "PATH_NOT_FOUND", .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        let mut sorted_entries: Vec<(&String, &RewriteSpec)> = entries.iter().collect();
        sorted_entries.sort_by(|a, b| a.0.cmp(b.0));

        for (target_path, spec) in sorted_entries {
            let segments = parse_path(target_path)?;
            if segments.is_empty() {
                return Err(CoreError::validation("INVALID_PATH", "rewrite cannot target the bare root"));
            }

            let target_key = match spec {
                RewriteSpec::From(src_path) => {
                    let src_segments = parse_path(src_path)?;
                    let resolved = resolve_path(&self.store, original_root, &Segments::Names(src_segments))
                        .await
                        .map_err(|e| match e {
                            CoreError::NotFound { code: "PATH_NOT_FOUND", .. } => {
                                CoreError::not_found("PATH_NOT_FOUND", src_path.clone())
                            }
                            other => other,
                        })?;
                    resolved.key
                }
                RewriteSpec::Dir => {
                    let key = empty_dnode_key();
                    self.store.put_bytes(key, crate::codec::empty_dnode_bytes()).await?;
                    key
                }
                RewriteSpec::Link(key) => {
                    authorize_link(&self.store, &self.ownership, &self.depots, delegate, *key, proof).await?;
                    *key
                }
            };

            let (parent_segments, leaf) = segments.split_at(segments.len() - 1);
            let leaf_name = &leaf[0];
            let ctx = ensure_parent_dirs(&self.store, rolling_root, parent_segments).await?;
            let new_entries = if ctx.parent_entries.iter().any(|e| &e.name == leaf_name) {
                replace_child(&ctx.parent_entries, leaf_name, target_key)?
            } else {
                insert_child(&ctx.parent_entries, leaf_name, target_key)?
            };
            rolling_root = splice_and_rebuild(&self.store, new_entries, &ctx.parent_path).await?;
        }

        Ok(rolling_root)
    }

    /// `stat(path | indexPath)` — reports kind/size/childCount without
    /// transferring file bytes, for the HTTP surface's metadata-only
    /// endpoints.
    pub async fn stat(&self, root: NodeKey, target: &Segments) -> Result<StatResult, CoreError> {
        let resolved = resolve_path(&self.store, root, target).await?;
        match resolved.node {
            CasNode::FNode { info, .. } => Ok(StatResult::File { size: info.file_size, content_type: info.content_type }),
            CasNode::DNode { entries } => Ok(StatResult::Dir { child_count: entries.len() }),
            _ => Err(CoreError::internal("resolved node is neither a file nor a directory")),
        }
    }

    /// `read(path | indexPath)` — reconstructs a file's bytes, content type,
    /// and size from its root node.
    pub async fn read(&self, root: NodeKey, target: &Segments) -> Result<(Vec<u8>, String, u64), CoreError> {
        let resolved = resolve_path(&self.store, root, target).await?;
        match resolved.node {
            CasNode::FNode { info, children, data } => {
                let mut out = Vec::new();
                for child_key in &children {
                    let child_node = self.store.get(child_key).await?;
                    out.extend(read_data_boxed(&self.store, child_node).await?);
                }
                out.extend(data);
                Ok((out, info.content_type, info.file_size))
            }
            CasNode::DNode { .. } => Err(CoreError::type_mismatch("NOT_A_FILE", "path resolves to a directory")),
            _ => Err(CoreError::internal("resolved node is neither a file nor a directory")),
        }
    }

    pub fn parse_path_or_index(path: Option<&str>, index_path: Option<&str>) -> Result<Segments, CoreError> {
        match (path, index_path) {
            (Some(_), Some(_)) => Err(CoreError::validation("INVALID_PATH", "provide exactly one of path or indexPath")),
            (Some(p), None) => Ok(Segments::Names(parse_path(p)?)),
            (None, Some(ip)) => Ok(Segments::Indices(parse_index_path(ip)?)),
            (None, None) => Ok(Segments::Names(vec![])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{new_root, Capabilities};
    use crate::ids::DelegateId;
    use crate::store::{MemoryCache, MemoryMetadataStore, MemoryNodeStore, WellKnownNodeStore};

    fn ops() -> FsOps {
        let store = NodeStoreHandle::new(Arc::new(WellKnownNodeStore::new(Arc::new(MemoryNodeStore::new()))));
        let ownership = Arc::new(OwnershipIndex::new(Arc::new(MemoryMetadataStore::new()), Arc::new(MemoryCache::new())));
        let depots = Arc::new(DepotRegistry::new(Arc::new(MemoryMetadataStore::new()), Arc::new(MemoryCache::new()), 50));
        FsOps::new(store, ownership, depots, 1024, 1000)
    }

    fn delegate() -> Delegate {
        new_root(DelegateId::from_bytes([1u8; 16]), "realm-a", Capabilities { can_upload: true, can_manage_depot: true })
    }

    async fn empty_root(fs: &FsOps) -> NodeKey {
        let key = empty_dnode_key();
        fs.store.put_bytes(key, crate::codec::empty_dnode_bytes()).await.unwrap();
        key
    }

    #[tokio::test]
    async fn scenario_empty_dir_roundtrip() {
        let fs = ops();
        let root = empty_root(&fs).await;
        assert_eq!(root, empty_dnode_key());
        let stat = fs.stat(root, &Segments::Names(vec![])).await.unwrap();
        assert!(matches!(stat, StatResult::Dir { child_count: 0 }));
    }

    #[tokio::test]
    async fn scenario_write_then_read() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();

        let target = Segments::Names(vec!["README.md".to_string()]);
        let outcome = fs.write(root, &target, b"# Hello".to_vec(), "text/plain", &delegate).await.unwrap();
        assert!(outcome.created);
        assert_ne!(outcome.new_root, root);

        let (bytes, content_type, size) = fs.read(outcome.new_root, &target).await.unwrap();
        assert_eq!(bytes, b"# Hello");
        assert_eq!(content_type, "text/plain");
        assert_eq!(size, 7);
    }

    #[tokio::test]
    async fn scenario_write_overwrite_reports_created_false() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();
        let target = Segments::Names(vec!["a.txt".to_string()]);

        let first = fs.write(root, &target, b"one".to_vec(), "text/plain", &delegate).await.unwrap();
        assert!(first.created);
        let second = fs.write(first.new_root, &target, b"two".to_vec(), "text/plain", &delegate).await.unwrap();
        assert!(!second.created);

        let (bytes, _, _) = fs.read(second.new_root, &target).await.unwrap();
        assert_eq!(bytes, b"two");
    }

    #[tokio::test]
    async fn scenario_deep_mkdir() {
        let fs = ops();
        let root = empty_root(&fs).await;

        let (new_root, created) = fs.mkdir(root, "a/b/c").await.unwrap();
        assert!(created);

        let stat_c = fs.stat(new_root, &Segments::Names(vec!["a".into(), "b".into(), "c".into()])).await.unwrap();
        assert!(matches!(stat_c, StatResult::Dir { child_count: 0 }));
        let stat_a = fs.stat(new_root, &Segments::Names(vec!["a".into()])).await.unwrap();
        assert!(matches!(stat_a, StatResult::Dir { child_count: 1 }));
        let stat_b = fs.stat(new_root, &Segments::Names(vec!["a".into(), "b".into()])).await.unwrap();
        assert!(matches!(stat_b, StatResult::Dir { child_count: 1 }));

        let (_, created_again) = fs.mkdir(new_root, "a/b/c").await.unwrap();
        assert!(!created_again);
    }

    #[tokio::test]
    async fn scenario_mkdir_over_file_fails() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();
        let write = fs
            .write(root, &Segments::Names(vec!["x".to_string()]), b"data".to_vec(), "text/plain", &delegate)
            .await
            .unwrap();
        let result = fs.mkdir(write.new_root, "x").await;
        assert!(matches!(result, Err(CoreError::Conflict { code: "EXISTS_AS_FILE", .. })));
    }

    #[tokio::test]
    async fn scenario_rm_root_disallowed() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let result = fs.rm(root, &Segments::Names(vec![])).await;
        assert!(matches!(result, Err(CoreError::Conflict { code: "CANNOT_REMOVE_ROOT", .. })));
    }

    #[tokio::test]
    async fn scenario_rm_missing_path() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let result = fs.rm(root, &Segments::Names(vec!["missing".to_string()])).await;
        assert!(matches!(result, Err(CoreError::NotFound { code: "PATH_NOT_FOUND", .. })));
    }

    #[tokio::test]
    async fn scenario_rewrite_move_and_delete() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();

        let write = fs
            .write(root, &Segments::Names(vec!["x.txt".to_string()]), b"hi".to_vec(), "text/plain", &delegate)
            .await
            .unwrap();
        let (with_dir, _) = fs.mkdir(write.new_root, "y").await.unwrap();

        let mut entries = std::collections::HashMap::new();
        entries.insert("y/x.txt".to_string(), RewriteSpec::From("x.txt".to_string()));
        let deletes = vec!["x.txt".to_string()];

        let new_root = fs.rewrite(with_dir, &entries, &deletes, &delegate, &ProofMap::new()).await.unwrap();

        // original x.txt still resolvable against the pre-rewrite root (the `from` source root)
        let original_stat = fs.stat(with_dir, &Segments::Names(vec!["x.txt".to_string()])).await;
        assert!(original_stat.is_ok());

        let moved = fs.stat(new_root, &Segments::Names(vec!["y".to_string(), "x.txt".to_string()])).await.unwrap();
        assert!(matches!(moved, StatResult::File { size: 2, .. }));
        let gone = fs.stat(new_root, &Segments::Names(vec!["x.txt".to_string()])).await;
        assert!(gone.is_err());
    }

    #[tokio::test]
    async fn scenario_rewrite_empty_rejected() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();
        let result = fs.rewrite(root, &std::collections::HashMap::new(), &[], &delegate, &ProofMap::new()).await;
        assert!(matches!(result, Err(CoreError::Validation { code: "EMPTY_REWRITE", .. })));
    }

    #[tokio::test]
    async fn scenario_rewrite_missing_from_fails_whole_batch() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();
        let mut entries = std::collections::HashMap::new();
        entries.insert("dest".to_string(), RewriteSpec::From("does-not-exist".to_string()));
        let result = fs.rewrite(root, &entries, &[], &delegate, &ProofMap::new()).await;
        assert!(matches!(result, Err(CoreError::NotFound { code: "PATH_NOT_FOUND", .. })));
    }

    #[tokio::test]
    async fn mv_into_self_rejected() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let (with_dir, _) = fs.mkdir(root, "a").await.unwrap();
        let result = fs.mv(with_dir, "a", "a/b").await;
        assert!(matches!(result, Err(CoreError::Conflict { code: "MOVE_INTO_SELF", .. })));
    }

    #[tokio::test]
    async fn mv_file_into_existing_dir_uses_source_name() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();
        let write = fs
            .write(root, &Segments::Names(vec!["a.txt".to_string()]), b"data".to_vec(), "text/plain", &delegate)
            .await
            .unwrap();
        let (with_dir, _) = fs.mkdir(write.new_root, "dest").await.unwrap();

        let new_root = fs.mv(with_dir, "a.txt", "dest").await.unwrap();
        let stat = fs.stat(new_root, &Segments::Names(vec!["dest".to_string(), "a.txt".to_string()])).await.unwrap();
        assert!(matches!(stat, StatResult::File { .. }));
        assert!(fs.stat(new_root, &Segments::Names(vec!["a.txt".to_string()])).await.is_err());
    }

    #[tokio::test]
    async fn cp_duplicates_without_removing_source() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();
        let write = fs
            .write(root, &Segments::Names(vec!["a.txt".to_string()]), b"data".to_vec(), "text/plain", &delegate)
            .await
            .unwrap();

        let new_root = fs.cp(write.new_root, "a.txt", "b.txt").await.unwrap();
        let (a, _, _) = fs.read(new_root, &Segments::Names(vec!["a.txt".to_string()])).await.unwrap();
        let (b, _, _) = fs.read(new_root, &Segments::Names(vec!["b.txt".to_string()])).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn cp_target_exists_rejected() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();
        let write_a = fs
            .write(root, &Segments::Names(vec!["a.txt".to_string()]), b"data".to_vec(), "text/plain", &delegate)
            .await
            .unwrap();
        let write_b = fs
            .write(write_a.new_root, &Segments::Names(vec!["b.txt".to_string()]), b"other".to_vec(), "text/plain", &delegate)
            .await
            .unwrap();

        let result = fs.cp(write_b.new_root, "a.txt", "b.txt").await;
        assert!(matches!(result, Err(CoreError::Conflict { code: "TARGET_EXISTS", .. })));
    }

    #[tokio::test]
    async fn write_file_too_large_rejected() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();
        let data = vec![0u8; FILE_MAX_SINGLE_BLOCK + 1];
        let result = fs.write(root, &Segments::Names(vec!["big".to_string()]), data, "application/octet-stream", &delegate).await;
        assert!(matches!(result, Err(CoreError::Validation { code: "FILE_TOO_LARGE", .. })));
    }

    #[tokio::test]
    async fn immutability_old_root_still_navigable_after_write() {
        let fs = ops();
        let root = empty_root(&fs).await;
        let delegate = delegate();
        let outcome = fs
            .write(root, &Segments::Names(vec!["a.txt".to_string()]), b"data".to_vec(), "text/plain", &delegate)
            .await
            .unwrap();

        // the old (empty) root is still fully navigable and unaffected
        let stat_old = fs.stat(root, &Segments::Names(vec![])).await.unwrap();
        assert!(matches!(stat_old, StatResult::Dir { child_count: 0 }));
        assert!(fs.stat(root, &Segments::Names(vec!["a.txt".to_string()])).await.is_err());

        let stat_new = fs.stat(outcome.new_root, &Segments::Names(vec!["a.txt".to_string()])).await.unwrap();
        assert!(matches!(stat_new, StatResult::File { .. }));
    }
}
