//! Authorization layer. the gate that decides
//! whether an arbitrary node reference is allowed, the engine that
//! verifies index-path/depot proofs backing that decision, and the Claim
//! Protocol for acquiring ownership of pre-existing nodes.

pub mod claim;
pub mod gate;
pub mod proof;

pub use claim::{claim, ActingToken, ClaimOutcome, TokenKind};
pub use gate::authorize_link;
pub use proof::{node_hash_hex, parse_proof_header, resolve_scope_roots, verify_word, ProofMap, ProofWord};
