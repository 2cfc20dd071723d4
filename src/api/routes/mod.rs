//! Route modules, one per resource family, each exposing a `router()`
//! that returns a `Router<SharedAppState>` to be merged into the top
//! level app router.

pub mod claim;
pub mod delegate;
pub mod depot;
pub mod fs;
pub mod node;
pub mod ticket;

use axum::Router;

use crate::api::server::SharedAppState;

/// Merge every resource router into one, plus a liveness check used by
/// deployment health probes.
pub fn router() -> Router<SharedAppState> {
    Router::new()
        .route("/healthz", axum::routing::get(health))
        .merge(fs::router())
        .merge(depot::router())
        .merge(delegate::router())
        .merge(claim::router())
        .merge(ticket::router())
        .merge(node::router())
}

async fn health() -> &'static str {
    "ok"
}
