//! Content-address key derivation
//!
//! A node's key is a pure function of its encoded bytes: a 16-byte BLAKE3
//! hash with the first byte optionally replaced by a monotonic size-class
//! flag, so that key ordering tracks size ordering without a side channel.

use crate::ids::NodeKey;

pub const HASH_ALGO_BLAKE3_128: u8 = 0;

/// Smallest `(h, l)` with `l in [1,15]`, `h in [0,15]` such that `l * 16^h >=
/// size`; the flag byte is `(h<<4)|l`. `0x00` is reserved for `size == 0`.
///
/// Iterating `h` ascending and returning the first feasible `l` yields the
/// minimal flag byte for a given size (since `h` dominates the byte), which
/// is what gives the key ordering its monotonicity and tightness.
pub fn size_class_flag(size: u64) -> u8 {
    if size == 0 {
        return 0x00;
    }

    for h in 0u32..=15 {
        let capacity = 16u64.pow(h);
        let l = size.div_ceil(capacity).max(1);
        if l <= 15 {
            return ((h as u8) << 4) | (l as u8);
        }
    }

    // size exceeds the representable range [0, 15*16^15]; no valid (h,l)
    // pair exists. Saturate to the maximum flag rather than panic.
    0xFF
}

/// Derive the content-address key for a node's serialized bytes.
pub fn derive_key(bytes: &[u8]) -> NodeKey {
    let hash = blake3::hash(bytes);
    let mut out = [0u8; 16];
    out.copy_from_slice(&hash.as_bytes()[0..16]);
    out[0] = size_class_flag(bytes.len() as u64);
    NodeKey::from_bytes(out)
}

/// The well-known empty directory node: header only, kind = dict, count =
/// 0, size = 0. Recognized by key without touching the node store.
pub fn empty_dnode_bytes() -> Vec<u8> {
    use super::header::{Header, NodeKind};

    Header {
        kind: NodeKind::DNode,
        ext_units: 0,
        block_size_class: 0,
        hash_algo: HASH_ALGO_BLAKE3_128,
        payload_size: 0,
        child_count: 0,
    }
    .to_bytes()
    .to_vec()
}

pub fn empty_dnode_key() -> NodeKey {
    derive_key(&empty_dnode_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_size_reserved() {
        assert_eq!(size_class_flag(0), 0x00);
    }

    #[test]
    fn test_monotonic_ordering() {
        let mut prev = size_class_flag(1);
        for s in 2u64..20_000 {
            let flag = size_class_flag(s);
            assert!(flag >= prev, "flag decreased at size {s}");
            prev = flag;
        }
    }

    #[test]
    fn test_flag_covers_size() {
        for s in [1u64, 15, 16, 255, 256, 65536, 1_000_000] {
            let flag = size_class_flag(s);
            let h = (flag >> 4) as u32;
            let l = (flag & 0xF) as u64;
            let capacity = l * 16u64.pow(h);
            assert!(capacity >= s, "flag for size {s} does not cover it");
        }
    }

    #[test]
    fn test_derive_key_deterministic() {
        let bytes = b"hello world".to_vec();
        assert_eq!(derive_key(&bytes), derive_key(&bytes));
    }

    #[test]
    fn test_empty_dnode_key_is_well_known() {
        let key1 = empty_dnode_key();
        let key2 = empty_dnode_key();
        assert_eq!(key1, key2);
    }
}
