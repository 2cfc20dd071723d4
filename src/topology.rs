//! B-Tree layout computation (L0). //!
//! Computes the unique node tree shape for a given file size and node
//! limit: how many bytes each node in the tree holds directly versus how
//! much is pushed down into children, filled greedily left to right. This
//! module is pure — it knows nothing about the codec or the node store;
//! `upload` turns a computed layout plus the file's bytes into actual CAS
//! nodes.

use crate::common::error::CoreError;

/// One level of the computed tree: how many bytes this node carries
/// directly (`own_data_size`) and the sub-layouts of its children, ordered
/// leftmost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutNode {
    pub own_data_size: u64,
    pub children: Vec<LayoutNode>,
}

impl LayoutNode {
    /// Sum of `own_data_size` across this node and all descendants — must
    /// equal the original `fileSize`.
    pub fn total_size(&self) -> u64 {
        self.own_data_size + self.children.iter().map(LayoutNode::total_size).sum::<u64>()
    }

    pub fn depth(&self) -> u32 {
        1 + self.children.iter().map(LayoutNode::depth).max().unwrap_or(0)
    }
}

/// `L = nodeLimit - 16`, the usable space left after the 16-byte header.
pub fn usable_space(node_limit: u32) -> u64 {
    node_limit as u64 - 16
}

fn ceil_div(a: u64, b: u64) -> u64 {
    debug_assert!(b > 0);
    (a + b - 1) / b
}

/// `C(d) = L^d / 16^(d-1)` for `d >= 1`; capacity of a subtree rooted at
/// depth `d`. Uses `u128` intermediates since `L^d` can exceed `u64` well
/// before the depths this crate's node limits realistically reach.
pub fn capacity(depth: u32, node_limit: u32) -> u64 {
    if depth == 0 {
        return 0;
    }
    let l = usable_space(node_limit) as u128;
    if depth == 1 {
        return l as u64;
    }
    let numerator = l.pow(depth);
    let denominator = 16u128.pow(depth - 1);
    (numerator / denominator).min(u64::MAX as u128) as u64
}

fn min_depth(file_size: u64, node_limit: u32) -> u32 {
    let mut d = 1;
    while capacity(d, node_limit) < file_size {
        d += 1;
        if d > 64 {
            // Astronomically large file for any sane node_limit; bail
            // rather than loop forever.
            break;
        }
    }
    d
}

/// `computeLayout(fileSize, nodeLimit) -> LayoutTree`. ///
/// A `fileSize` of zero still produces a valid single-leaf layout with
/// `own_data_size == 0` (the empty file).
pub fn compute_layout(file_size: u64, node_limit: u32) -> Result<LayoutNode, CoreError> {
    if node_limit <= 16 {
        return Err(CoreError::validation("INVALID_NODE_LIMIT", "nodeLimit must exceed the 16-byte header"));
    }
    let l = usable_space(node_limit);
    if file_size <= l {
        return Ok(LayoutNode { own_data_size: file_size, children: vec![] });
    }

    let depth = min_depth(file_size, node_limit);
    build(file_size, depth, node_limit)
}

fn build(remaining: u64, depth: u32, node_limit: u32) -> Result<LayoutNode, CoreError> {
    let l = usable_space(node_limit);
    if depth == 1 {
        return Ok(LayoutNode { own_data_size: remaining, children: vec![] });
    }

    let child_cap = capacity(depth - 1, node_limit);
    if child_cap <= 16 {
        return Err(CoreError::internal("child capacity underflow while computing layout"));
    }

    let child_count = ceil_div(remaining - l, child_cap - 16);
    let own_data = l - 16 * child_count;
    let mut left = remaining - own_data;

    let mut children = Vec::with_capacity(child_count as usize);
    for _ in 0..child_count {
        let take = left.min(child_cap);
        children.push(build(take, depth - 1, node_limit)?);
        left -= take;
    }

    debug_assert_eq!(left, 0);
    Ok(LayoutNode { own_data_size: own_data, children })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE_LIMIT: u32 = 1024;

    #[test]
    fn test_single_leaf_for_small_files() {
        let layout = compute_layout(100, NODE_LIMIT).unwrap();
        assert!(layout.children.is_empty());
        assert_eq!(layout.own_data_size, 100);
    }

    #[test]
    fn test_empty_file() {
        let layout = compute_layout(0, NODE_LIMIT).unwrap();
        assert_eq!(layout.total_size(), 0);
        assert!(layout.children.is_empty());
    }

    #[test]
    fn test_exact_leaf_boundary() {
        let l = usable_space(NODE_LIMIT);
        let layout = compute_layout(l, NODE_LIMIT).unwrap();
        assert!(layout.children.is_empty());
        assert_eq!(layout.own_data_size, l);
    }

    #[test]
    fn test_total_size_matches_file_size_across_range() {
        for size in [0u64, 1, 500, 1008, 1009, 5000, 50_000, 200_000, 2_000_000] {
            let layout = compute_layout(size, NODE_LIMIT).unwrap();
            assert_eq!(layout.total_size(), size, "mismatch for size {size}");
        }
    }

    #[test]
    fn test_layout_is_deterministic() {
        let a = compute_layout(123_456, NODE_LIMIT).unwrap();
        let b = compute_layout(123_456, NODE_LIMIT).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_depth_two_within_capacity_one() {
        let c1 = capacity(1, NODE_LIMIT);
        let c2 = capacity(2, NODE_LIMIT);
        assert!(c2 > c1);
        let layout = compute_layout(c1 + 1, NODE_LIMIT).unwrap();
        assert!(!layout.children.is_empty());
    }

    #[test]
    fn test_capacity_formula_depth_two() {
        let l = usable_space(NODE_LIMIT);
        assert_eq!(capacity(2, NODE_LIMIT), (l * l) / 16);
    }

    #[test]
    fn test_invalid_node_limit_rejected() {
        assert!(compute_layout(10, 16).is_err());
    }
}
