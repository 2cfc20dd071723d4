//! API Server Module
//!
//! Composition root for the HTTP layer: holds every collaborator the core
//! operations need (node store, ownership index, depot registry, delegate
//! store, ticket store) behind `Arc`s so cloning `AppState` into a handler
//! never copies data, only reference-counts it. Built from `Arc<dyn
//! Trait>` collaborators wired together in one place rather than a
//! single monolithic service struct.

use std::sync::Arc;

use crate::auth::claim::ActingToken;
use crate::config::{CasVaultConfig, MetadataBackend, StoreBackend};
use crate::delegate::DelegateStore;
use crate::depot::DepotRegistry;
use crate::fs::FsOps;
use crate::ownership::OwnershipIndex;
use crate::store::{Cache, LocalFsNodeStore, MemoryCache, MemoryMetadataStore, MemoryNodeStore, MetadataStore, NullCache, WellKnownNodeStore};
use crate::ticket::TicketStore;
use crate::tree::NodeStoreHandle;

/// Combined application state for all API endpoints.
pub struct AppState {
    pub store: NodeStoreHandle,
    pub ownership: Arc<OwnershipIndex>,
    pub depots: Arc<DepotRegistry>,
    pub delegates: Arc<DelegateStore>,
    pub tickets: Arc<TicketStore>,
    pub fs: Arc<FsOps>,
    pub node_limit: u32,
}

/// Shared application state type.
pub type SharedAppState = Arc<AppState>;

impl AppState {
    /// Assemble the composition root from a loaded `CasVaultConfig` — the
    /// only place concrete `NodeStore`/`MetadataStore`/`Cache`
    /// implementations are chosen: construct once at startup and pass
    /// the resulting interfaces down by value.
    pub fn from_config(config: &CasVaultConfig) -> Result<SharedAppState, crate::common::error::CoreError> {
        let node_store: Arc<dyn crate::store::NodeStore> = match config.store_backend {
            StoreBackend::Memory => Arc::new(MemoryNodeStore::new()),
            StoreBackend::LocalFs => {
                let dir = config.store_dir.as_deref().ok_or_else(|| {
                    crate::common::error::CoreError::internal("local-fs backend selected without CASVAULT_STORE_DIR")
                })?;
                Arc::new(LocalFsNodeStore::new(dir))
            }
        };
        let node_store: Arc<dyn crate::store::NodeStore> = Arc::new(WellKnownNodeStore::new(node_store));

        let metadata: Arc<dyn MetadataStore> = match config.metadata_backend {
            MetadataBackend::Memory => Arc::new(MemoryMetadataStore::new()),
            MetadataBackend::Sqlite => {
                let path = config.sqlite_path.as_deref().ok_or_else(|| {
                    crate::common::error::CoreError::internal("sqlite backend selected without CASVAULT_SQLITE_PATH")
                })?;
                Arc::new(
                    crate::store::SqliteMetadataStore::new(path)
                        .map_err(|e| crate::common::error::CoreError::internal(e.to_string()))?,
                )
            }
        };
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());

        Ok(Self::new(node_store, metadata, cache, config.node_limit, config.max_depot_history as u32, config.max_rewrite_entries))
    }

    /// Assemble an in-memory composition root with no caching — used by
    /// the `demo` binary mode and integration tests that want the full
    /// wiring without a filesystem or database.
    pub fn in_memory(node_limit: u32, max_depot_history: u32, max_rewrite_entries: usize) -> SharedAppState {
        let node_store: Arc<dyn crate::store::NodeStore> = Arc::new(WellKnownNodeStore::new(Arc::new(MemoryNodeStore::new())));
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let cache: Arc<dyn Cache> = Arc::new(NullCache::new());
        Self::new(node_store, metadata, cache, node_limit, max_depot_history, max_rewrite_entries)
    }

    fn new(
        node_store: Arc<dyn crate::store::NodeStore>,
        metadata: Arc<dyn MetadataStore>,
        cache: Arc<dyn Cache>,
        node_limit: u32,
        max_depot_history: u32,
        max_rewrite_entries: usize,
    ) -> SharedAppState {
        let store = NodeStoreHandle::new(node_store);
        let ownership = Arc::new(OwnershipIndex::new(metadata.clone(), cache.clone()));
        let depots = Arc::new(DepotRegistry::new(metadata.clone(), cache, max_depot_history));
        let delegates = Arc::new(DelegateStore::new(metadata.clone()));
        let tickets = Arc::new(TicketStore::new(metadata));
        let fs = Arc::new(FsOps::new(store.clone(), ownership.clone(), depots.clone(), node_limit, max_rewrite_entries));

        Arc::new(Self { store, ownership, depots, delegates, tickets, fs, node_limit })
    }
}

/// Resolves the acting token context from request headers. Token
/// issuance/authentication itself is a Non-goal; the HTTP layer only
/// needs to know whether the presented token is an access token, whether
/// it carries `canUpload`, and its realm, which here is read directly off
/// trusted headers set by whatever auth proxy sits in front of this
/// service. A production deployment swaps this for real JWT verification
/// without touching any downstream caller, since only the interface is
/// passed around.
pub fn acting_token_from_headers(headers: &axum::http::HeaderMap) -> Option<ActingToken> {
    let realm = headers.get("x-cas-realm")?.to_str().ok()?.to_string();
    let can_upload = headers.get("x-cas-can-upload").and_then(|v| v.to_str().ok()) == Some("true");
    Some(ActingToken { kind: crate::auth::claim::TokenKind::Access, can_upload, realm })
}
