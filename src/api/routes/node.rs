//! Raw node access route.
//! Serves a CAS node's raw encoded bytes by key, for clients that already
//! hold a key (from a prior write, proof, or directory listing) and want
//! the bytes directly rather than going through a filesystem path.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use crate::api::server::SharedAppState;
use crate::codec::NodeKey;
use crate::common::error::{CoreError, Result};
use crate::ids::NodeKey as IdNodeKey;

pub fn router() -> axum::Router<SharedAppState> {
    axum::Router::new().route("/v1/nodes/:key", axum::routing::get(get_node))
}

async fn get_node(State(state): State<SharedAppState>, Path(key): Path<String>) -> Result<Response> {
    let key: NodeKey = key.parse::<IdNodeKey>()?;
    let bytes = state
        .store
        .get_bytes(&key)
        .await?
        .ok_or_else(|| CoreError::not_found("NODE_NOT_FOUND", key.to_string()))?;
    Ok(([(axum::http::header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}
