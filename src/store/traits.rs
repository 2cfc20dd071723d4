//! Node Store / Metadata Store / Cache collaborator traits. Shaped after
//! a `DepositStore`/`StealthStore`-style split (one trait per
//! collaborator, `async_trait`, `Send + Sync`, a dedicated error enum),
//! generalized from record-shaped storage to byte- and
//! precondition-oriented storage.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::codec::NodeKey;

/// Storage errors surfaced by `NodeStore` / `MetadataStore`. Cache errors
/// never reach callers so `Cache` has no error type at all.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("precondition failed for key {0}")]
    PreconditionFailed(String),

    #[error("node key mismatch: computed {computed} but caller supplied {supplied}")]
    KeyMismatch { computed: String, supplied: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend timeout: {0}")]
    Timeout(String),
}

impl StoreError {
    /// Whether a single automatic retry is appropriate for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Content-addressed blob storage for CAS nodes.
///
/// `put` is idempotent: re-uploading identical bytes under the same key is
/// a no-op. Well-known nodes (currently just the empty directory) are
/// expected to be handled by a decorator in front of any concrete
/// implementation so that they never touch the backend at all.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn put(&self, key: NodeKey, bytes: Vec<u8>) -> StoreResult<()>;
    async fn get(&self, key: &NodeKey) -> StoreResult<Option<Vec<u8>>>;
    async fn has(&self, key: &NodeKey) -> StoreResult<bool>;
}

/// Optimistic-concurrency precondition for `MetadataStore::put_if` — the
/// "compare-and-set" primitive every depot commit and token rotation is
/// built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Succeed only if no value currently exists for the key.
    Absent,
    /// Succeed only if the current value's bytes equal the given bytes.
    Equals(Vec<u8>),
    /// No precondition — last writer wins.
    None,
}

/// A page of `list` results plus an opaque cursor for the next page.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<(String, Vec<u8>)>,
    pub next_cursor: Option<String>,
}

/// Conditional key-value metadata storage — a DynamoDB-shaped
/// collaborator abstracted behind a trait.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    async fn put_if(&self, key: &str, value: Vec<u8>, precondition: Precondition) -> StoreResult<()>;
    async fn delete(&self, key: &str) -> StoreResult<()>;
    async fn list(&self, prefix: &str, cursor: Option<String>, limit: usize) -> StoreResult<Page>;
}

/// Infallible-from-the-caller's-perspective cache. Every
/// method degrades silently to a miss/no-op, so the trait itself carries
/// no `Result`.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>);
    async fn del(&self, key: &str);
    async fn mget(&self, keys: &[String]) -> Vec<Option<String>>;
}
