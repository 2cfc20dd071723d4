//! CAS Binary Format Codec
//!
//! Encodes and decodes the four CAS node kinds and derives their
//! content-address keys. This is the lowest layer of the stack (L0); every
//! other module depends on it but it depends on nothing else in the crate
//! besides the error taxonomy and the id newtypes.

mod header;
mod key;
mod node;

pub use header::{Header, NodeKind, CONTENT_TYPE_LEN, FILE_INFO_LEN, HEADER_LEN, MAGIC};
pub use key::{derive_key, empty_dnode_bytes, empty_dnode_key, size_class_flag, HASH_ALGO_BLAKE3_128};
pub use node::{decode, encode_dict, encode_file, encode_set, encode_successor, CasNode, DirEntry, FileInfo};

// Re-exported so the rest of the crate (and `common::error`, which needs it
// for `ConflictDetails`) can refer to the node key type through `codec`,
// matching its framing of key derivation as part of the codec.
pub use crate::ids::NodeKey;
