//! CAS node variants and their encode/decode routines.
//!
//! Four kinds, one discriminated enum: f-node (file root), s-node (file
//! successor), d-node (directory), set-node (authorization scope set).

use crate::common::error::CoreError;
use crate::ids::NodeKey;

use super::header::{Header, NodeKind, CONTENT_TYPE_LEN, FILE_INFO_LEN, HEADER_LEN};
use super::key::{derive_key, HASH_ALGO_BLAKE3_128};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_size: u64,
    pub content_type: String,
}

impl FileInfo {
    fn to_bytes(&self) -> Result<[u8; FILE_INFO_LEN], CoreError> {
        if !self.content_type.is_ascii() {
            return Err(CoreError::validation(
                "FAIL_BAD_FILEINFO",
                "contentType must be ASCII",
            ));
        }
        if self.content_type.len() > CONTENT_TYPE_LEN {
            return Err(CoreError::validation(
                "FAIL_BAD_FILEINFO",
                format!("contentType longer than {CONTENT_TYPE_LEN} bytes"),
            ));
        }

        let mut out = [0u8; FILE_INFO_LEN];
        out[0..8].copy_from_slice(&self.file_size.to_le_bytes());
        let ct_bytes = self.content_type.as_bytes();
        out[8..8 + ct_bytes.len()].copy_from_slice(ct_bytes);
        // remaining bytes are already zero (padding)
        Ok(out)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != FILE_INFO_LEN {
            return Err(CoreError::validation("FAIL_BAD_FILEINFO", "FileInfo must be 64 bytes"));
        }

        let file_size = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let ct_raw = &bytes[8..FILE_INFO_LEN];

        let zero_pos = ct_raw.iter().position(|&b| b == 0).unwrap_or(ct_raw.len());
        let (ct_bytes, padding) = ct_raw.split_at(zero_pos);

        if !padding.iter().all(|&b| b == 0) {
            return Err(CoreError::validation(
                "FAIL_BAD_FILEINFO",
                "contentType padding must be zero after the first NUL",
            ));
        }

        if !ct_bytes.iter().all(|&b| b.is_ascii_graphic() || b == b' ') {
            return Err(CoreError::validation(
                "FAIL_BAD_FILEINFO",
                "contentType must be printable ASCII",
            ));
        }

        let content_type = std::str::from_utf8(ct_bytes)
            .map_err(|_| CoreError::validation("FAIL_BAD_FILEINFO", "contentType must be valid UTF-8"))?
            .to_string();

        Ok(Self { file_size, content_type })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub child: NodeKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasNode {
    FNode {
        info: FileInfo,
        children: Vec<NodeKey>,
        data: Vec<u8>,
    },
    SNode {
        children: Vec<NodeKey>,
        data: Vec<u8>,
    },
    DNode {
        entries: Vec<DirEntry>,
    },
    SetNode {
        children: Vec<NodeKey>,
    },
}

impl CasNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            CasNode::FNode { .. } => NodeKind::FNode,
            CasNode::SNode { .. } => NodeKind::SNode,
            CasNode::DNode { .. } => NodeKind::DNode,
            CasNode::SetNode { .. } => NodeKind::SetNode,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, CasNode::DNode { .. })
    }

    pub fn is_file_root(&self) -> bool {
        matches!(self, CasNode::FNode { .. })
    }
}

/// `encodeFile(data, contentType, fileSize, children) -> (bytes, key)`.
pub fn encode_file(
    data: Vec<u8>,
    content_type: String,
    file_size: u64,
    children: Vec<NodeKey>,
) -> Result<(Vec<u8>, NodeKey), CoreError> {
    let info = FileInfo { file_size, content_type };
    let info_bytes = info.to_bytes()?;

    let header = Header {
        kind: NodeKind::FNode,
        ext_units: 0,
        block_size_class: super::key::size_class_flag(data.len() as u64) & 0xF,
        hash_algo: HASH_ALGO_BLAKE3_128,
        payload_size: data.len() as u32,
        child_count: children.len() as u32,
    };

    let mut bytes = Vec::with_capacity(header.total_len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&info_bytes);
    for child in &children {
        bytes.extend_from_slice(child.as_bytes());
    }
    bytes.extend_from_slice(&data);

    let key = derive_key(&bytes);
    Ok((bytes, key))
}

/// `encodeSuccessor(data, children) -> (bytes, key)`.
pub fn encode_successor(data: Vec<u8>, children: Vec<NodeKey>) -> Result<(Vec<u8>, NodeKey), CoreError> {
    let header = Header {
        kind: NodeKind::SNode,
        ext_units: 0,
        block_size_class: super::key::size_class_flag(data.len() as u64) & 0xF,
        hash_algo: HASH_ALGO_BLAKE3_128,
        payload_size: data.len() as u32,
        child_count: children.len() as u32,
    };

    let mut bytes = Vec::with_capacity(header.total_len());
    bytes.extend_from_slice(&header.to_bytes());
    for child in &children {
        bytes.extend_from_slice(child.as_bytes());
    }
    bytes.extend_from_slice(&data);

    let key = derive_key(&bytes);
    Ok((bytes, key))
}

/// `encodeDict(children, names) -> (bytes, key)`. Sorts (name, child) pairs
/// by UTF-8 bytes before serialization; fails if names are not unique.
pub fn encode_dict(mut entries: Vec<DirEntry>) -> Result<(Vec<u8>, NodeKey), CoreError> {
    entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

    for window in entries.windows(2) {
        if window[0].name == window[1].name {
            return Err(CoreError::validation(
                "FAIL_NAMES_DUPLICATE",
                format!("duplicate directory entry name: '{}'", window[0].name),
            ));
        }
    }

    let mut names_blob = Vec::new();
    for entry in &entries {
        let name_bytes = entry.name.as_bytes();
        if name_bytes.len() > u16::MAX as usize {
            return Err(CoreError::validation("FAIL_BAD_FILEINFO", "entry name too long"));
        }
        names_blob.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        names_blob.extend_from_slice(name_bytes);
    }

    let header = Header {
        kind: NodeKind::DNode,
        ext_units: 0,
        block_size_class: 0,
        hash_algo: HASH_ALGO_BLAKE3_128,
        payload_size: names_blob.len() as u32,
        child_count: entries.len() as u32,
    };

    let mut bytes = Vec::with_capacity(header.total_len());
    bytes.extend_from_slice(&header.to_bytes());
    for entry in &entries {
        bytes.extend_from_slice(entry.child.as_bytes());
    }
    bytes.extend_from_slice(&names_blob);

    let key = derive_key(&bytes);
    Ok((bytes, key))
}

/// `encodeSet(children) -> (bytes, key)`. Sorts by child key bytes; fails
/// if fewer than 2 or if duplicates.
pub fn encode_set(mut children: Vec<NodeKey>) -> Result<(Vec<u8>, NodeKey), CoreError> {
    if children.len() < 2 {
        return Err(CoreError::validation(
            "FAIL_SET_TOO_SMALL",
            "set-node requires at least 2 children",
        ));
    }

    children.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    for window in children.windows(2) {
        if window[0] == window[1] {
            return Err(CoreError::validation(
                "FAIL_SET_UNSORTED_OR_DUP",
                "duplicate child key in set-node",
            ));
        }
    }

    let header = Header {
        kind: NodeKind::SetNode,
        ext_units: 0,
        block_size_class: 0,
        hash_algo: HASH_ALGO_BLAKE3_128,
        payload_size: 0,
        child_count: children.len() as u32,
    };

    let mut bytes = Vec::with_capacity(header.total_len());
    bytes.extend_from_slice(&header.to_bytes());
    for child in &children {
        bytes.extend_from_slice(child.as_bytes());
    }

    let key = derive_key(&bytes);
    Ok((bytes, key))
}

/// `decode(bytes) -> node`. Validates magic, reserved bits, declared length
/// vs actual buffer length, kind-specific payload constraints.
pub fn decode(bytes: &[u8]) -> Result<CasNode, CoreError> {
    let header = Header::from_bytes(bytes)?;

    if header.total_len() != bytes.len() {
        return Err(CoreError::validation(
            "FAIL_LENGTH_MISMATCH",
            format!(
                "declared length {} does not match buffer length {}",
                header.total_len(),
                bytes.len()
            ),
        ));
    }

    match header.kind {
        NodeKind::FNode => decode_fnode(bytes, &header),
        NodeKind::SNode => decode_snode(bytes, &header),
        NodeKind::DNode => decode_dnode(bytes, &header),
        NodeKind::SetNode => decode_set_node(bytes, &header),
    }
}

fn read_children(bytes: &[u8], offset: usize, count: u32) -> Vec<NodeKey> {
    (0..count as usize)
        .map(|i| {
            let start = offset + i * 16;
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&bytes[start..start + 16]);
            NodeKey::from_bytes(buf)
        })
        .collect()
}

fn decode_fnode(bytes: &[u8], header: &Header) -> Result<CasNode, CoreError> {
    if header.ext_units != 0 {
        return Err(CoreError::validation(
            "FAIL_BAD_FILEINFO",
            "f-node must not carry generic header extensions",
        ));
    }

    let info_start = HEADER_LEN;
    let info = FileInfo::from_bytes(&bytes[info_start..info_start + FILE_INFO_LEN])?;

    let children_start = info_start + FILE_INFO_LEN;
    let children = read_children(bytes, children_start, header.child_count);

    let data_start = children_start + 16 * header.child_count as usize;
    let data = bytes[data_start..].to_vec();

    Ok(CasNode::FNode { info, children, data })
}

fn decode_snode(bytes: &[u8], header: &Header) -> Result<CasNode, CoreError> {
    if header.ext_units != 0 {
        return Err(CoreError::validation("FAIL_BAD_FILEINFO", "s-node must not carry an extension"));
    }

    let children_start = HEADER_LEN;
    let children = read_children(bytes, children_start, header.child_count);

    let data_start = children_start + 16 * header.child_count as usize;
    let data = bytes[data_start..].to_vec();

    Ok(CasNode::SNode { children, data })
}

fn decode_dnode(bytes: &[u8], header: &Header) -> Result<CasNode, CoreError> {
    let children_start = HEADER_LEN;
    let children = read_children(bytes, children_start, header.child_count);

    let names_start = children_start + 16 * header.child_count as usize;
    let names_blob = &bytes[names_start..];

    let mut entries = Vec::with_capacity(header.child_count as usize);
    let mut cursor = 0usize;
    for &child in &children {
        if cursor + 2 > names_blob.len() {
            return Err(CoreError::validation("FAIL_LENGTH_MISMATCH", "truncated name length prefix"));
        }
        let len = u16::from_le_bytes([names_blob[cursor], names_blob[cursor + 1]]) as usize;
        cursor += 2;

        if cursor + len > names_blob.len() {
            return Err(CoreError::validation("FAIL_LENGTH_MISMATCH", "truncated name bytes"));
        }
        let name = std::str::from_utf8(&names_blob[cursor..cursor + len])
            .map_err(|_| CoreError::validation("FAIL_LENGTH_MISMATCH", "directory entry name is not UTF-8"))?
            .to_string();
        cursor += len;

        entries.push(DirEntry { name, child });
    }

    if cursor != names_blob.len() {
        return Err(CoreError::validation("FAIL_LENGTH_MISMATCH", "trailing bytes after directory names"));
    }

    for window in entries.windows(2) {
        match window[0].name.as_bytes().cmp(window[1].name.as_bytes()) {
            std::cmp::Ordering::Less => {}
            std::cmp::Ordering::Equal => {
                return Err(CoreError::validation("FAIL_NAMES_DUPLICATE", "duplicate directory entry name"))
            }
            std::cmp::Ordering::Greater => {
                return Err(CoreError::validation("FAIL_NAMES_UNSORTED", "directory entries not sorted"))
            }
        }
    }

    Ok(CasNode::DNode { entries })
}

fn decode_set_node(bytes: &[u8], header: &Header) -> Result<CasNode, CoreError> {
    if header.payload_size != 0 {
        return Err(CoreError::validation("FAIL_SET_TOO_SMALL", "set-node payload size must be 0"));
    }
    if header.child_count < 2 {
        return Err(CoreError::validation("FAIL_SET_TOO_SMALL", "set-node requires at least 2 children"));
    }

    let children = read_children(bytes, HEADER_LEN, header.child_count);

    for window in children.windows(2) {
        if window[0].as_bytes() >= window[1].as_bytes() {
            return Err(CoreError::validation(
                "FAIL_SET_UNSORTED_OR_DUP",
                "set-node children must be strictly sorted ascending",
            ));
        }
    }

    Ok(CasNode::SetNode { children })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_roundtrip() {
        let (bytes, key) = encode_file(b"hello".to_vec(), "text/plain".to_string(), 5, vec![]).unwrap();
        let decoded = decode(&bytes).unwrap();
        match decoded {
            CasNode::FNode { info, children, data } => {
                assert_eq!(info.file_size, 5);
                assert_eq!(info.content_type, "text/plain");
                assert!(children.is_empty());
                assert_eq!(data, b"hello");
            }
            _ => panic!("expected f-node"),
        }
        assert_eq!(key, derive_key(&bytes));
    }

    #[test]
    fn test_dict_canonicalizes_order() {
        let k1 = NodeKey::from_bytes([1u8; 16]);
        let k2 = NodeKey::from_bytes([2u8; 16]);

        let (bytes_a, key_a) = encode_dict(vec![
            DirEntry { name: "b.txt".to_string(), child: k2 },
            DirEntry { name: "a.txt".to_string(), child: k1 },
        ])
        .unwrap();

        let (bytes_b, key_b) = encode_dict(vec![
            DirEntry { name: "a.txt".to_string(), child: k1 },
            DirEntry { name: "b.txt".to_string(), child: k2 },
        ])
        .unwrap();

        assert_eq!(bytes_a, bytes_b);
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn test_dict_rejects_duplicate_names() {
        let k1 = NodeKey::from_bytes([1u8; 16]);
        let k2 = NodeKey::from_bytes([2u8; 16]);
        let result = encode_dict(vec![
            DirEntry { name: "a.txt".to_string(), child: k1 },
            DirEntry { name: "a.txt".to_string(), child: k2 },
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_set_requires_two_children() {
        let k1 = NodeKey::from_bytes([1u8; 16]);
        assert!(encode_set(vec![k1]).is_err());
    }

    #[test]
    fn test_set_roundtrip_sorted() {
        let k1 = NodeKey::from_bytes([1u8; 16]);
        let k2 = NodeKey::from_bytes([2u8; 16]);
        let k3 = NodeKey::from_bytes([3u8; 16]);

        let (bytes, _) = encode_set(vec![k3, k1, k2]).unwrap();
        let decoded = decode(&bytes).unwrap();
        match decoded {
            CasNode::SetNode { children } => {
                assert_eq!(children, vec![k1, k2, k3]);
            }
            _ => panic!("expected set-node"),
        }
    }

    #[test]
    fn test_empty_dict_matches_well_known() {
        let (bytes, key) = encode_dict(vec![]).unwrap();
        assert_eq!(bytes, super::super::key::empty_dnode_bytes());
        assert_eq!(key, super::super::key::empty_dnode_key());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (mut bytes, _) = encode_file(b"hi".to_vec(), "text/plain".to_string(), 2, vec![]).unwrap();
        bytes.push(0xFF);
        assert!(decode(&bytes).is_err());
    }
}
