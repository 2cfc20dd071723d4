//! CAS node header (16 bytes, little-endian)
//!
//! `magic | flags | payload_size | child_count`. `flags` packs kind (bits
//! 0-1), header extension count (bits 2-3), block-size class (bits 4-7),
//! hash algorithm (bits 8-15); bits 16-31 are reserved and MUST be zero.

use crate::common::error::CoreError;

pub const MAGIC: u32 = 0x01534143; // "CAS\x01" read little-endian
pub const HEADER_LEN: usize = 16;

/// Fixed 64-byte extension carried by f-nodes only: `u64 LE fileSize` plus a
/// 56-byte ASCII content-type field, zero-padded. This is intrinsic to the
/// f-node kind, not counted in the 2-bit `ext_units` header field (which
/// only has room for 0..=3 and is reserved for future generic extensions);
/// f-nodes always decode with `ext_units == 0` and carry FileInfo as a
/// fixed addition to `total_len`.
pub const FILE_INFO_LEN: usize = 64;
pub const CONTENT_TYPE_LEN: usize = 56;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    FNode,
    SNode,
    DNode,
    SetNode,
}

impl NodeKind {
    fn bits(self) -> u32 {
        match self {
            NodeKind::FNode => 0,
            NodeKind::SNode => 1,
            NodeKind::DNode => 2,
            NodeKind::SetNode => 3,
        }
    }

    fn from_bits(bits: u32) -> Result<Self, CoreError> {
        match bits {
            0 => Ok(NodeKind::FNode),
            1 => Ok(NodeKind::SNode),
            2 => Ok(NodeKind::DNode),
            3 => Ok(NodeKind::SetNode),
            other => Err(CoreError::validation(
                "FAIL_BAD_KIND",
                format!("unknown node kind bits: {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub kind: NodeKind,
    pub ext_units: u32,
    pub block_size_class: u8,
    pub hash_algo: u8,
    pub payload_size: u32,
    pub child_count: u32,
}

impl Header {
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let flags = self.kind.bits()
            | (self.ext_units << 2)
            | ((self.block_size_class as u32 & 0xF) << 4)
            | ((self.hash_algo as u32 & 0xFF) << 8);

        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&flags.to_le_bytes());
        out[8..12].copy_from_slice(&self.payload_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.child_count.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() < HEADER_LEN {
            return Err(CoreError::validation(
                "FAIL_LENGTH_MISMATCH",
                format!("buffer shorter than header: {} bytes", bytes.len()),
            ));
        }

        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(CoreError::validation(
                "FAIL_MAGIC",
                format!("bad magic at offset 0: {magic:#010x}"),
            ));
        }

        let flags = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if flags & 0xFFFF_0000 != 0 {
            return Err(CoreError::validation(
                "FAIL_RESERVED_BITS",
                "reserved flag bits 16-31 must be zero".to_string(),
            ));
        }

        let kind = NodeKind::from_bits(flags & 0b11)?;
        let ext_units = (flags >> 2) & 0b11;
        let block_size_class = ((flags >> 4) & 0xF) as u8;
        let hash_algo = ((flags >> 8) & 0xFF) as u8;
        let payload_size = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let child_count = u32::from_le_bytes(bytes[12..16].try_into().unwrap());

        Ok(Self {
            kind,
            ext_units,
            block_size_class,
            hash_algo,
            payload_size,
            child_count,
        })
    }

    /// Total encoded node length implied by this header:
    /// `16 (header) + 16*ext_units (generic extensions) + 64 (FileInfo, f-nodes
    /// only) + 16*child_count + payload_size`.
    pub fn total_len(&self) -> usize {
        let file_info_len = if matches!(self.kind, NodeKind::FNode) { FILE_INFO_LEN } else { 0 };
        HEADER_LEN
            + HEADER_LEN * self.ext_units as usize
            + file_info_len
            + HEADER_LEN * self.child_count as usize
            + self.payload_size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = Header {
            kind: NodeKind::DNode,
            ext_units: 0,
            block_size_class: 5,
            hash_algo: 0,
            payload_size: 42,
            child_count: 3,
        };
        let bytes = header.to_bytes();
        let decoded = Header::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.kind, NodeKind::DNode);
        assert_eq!(decoded.payload_size, 42);
        assert_eq!(decoded.child_count, 3);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = 0xFF;
        assert!(Header::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_fnode_total_len_includes_file_info() {
        let header = Header {
            kind: NodeKind::FNode,
            ext_units: 0,
            block_size_class: 0,
            hash_algo: 0,
            payload_size: 10,
            child_count: 2,
        };
        // header + FileInfo(64) + 2 children*16 + 10 payload bytes
        assert_eq!(header.total_len(), HEADER_LEN + FILE_INFO_LEN + 2 * HEADER_LEN + 10);

        let snode = Header { kind: NodeKind::SNode, ..header };
        assert_eq!(snode.total_len(), HEADER_LEN + 2 * HEADER_LEN + 10);
    }

    #[test]
    fn test_reserved_bits_rejected() {
        let mut header = Header {
            kind: NodeKind::FNode,
            ext_units: 0,
            block_size_class: 0,
            hash_algo: 0,
            payload_size: 0,
            child_count: 0,
        }
        .to_bytes();
        header[6] = 0x01; // sets a bit within the reserved range (bit 16+)
        assert!(Header::from_bytes(&header).is_err());
    }
}
