//! Claim protocol route. The caller proves possession of an
//! access token for a node already in the store without re-uploading it.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::ActingDelegate;
use crate::api::server::{acting_token_from_headers, SharedAppState};
use crate::auth::claim::claim;
use crate::codec::NodeKey;
use crate::common::error::{CoreError, Result};
use crate::ids::NodeKey as IdNodeKey;

pub fn router() -> Router<SharedAppState> {
    Router::new().route("/v1/claim", axum::routing::post(submit_claim))
}

#[derive(Deserialize)]
struct ClaimRequest {
    node: String,
    pop: String,
}

#[derive(Serialize)]
struct ClaimResponse {
    already_owned: bool,
}

async fn submit_claim(
    State(state): State<SharedAppState>,
    headers: HeaderMap,
    ActingDelegate(delegate): ActingDelegate,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>> {
    let acting_token = acting_token_from_headers(&headers)
        .ok_or_else(|| CoreError::authorization("ACCESS_TOKEN_REQUIRED", "missing realm/upload headers for claim"))?;

    let access_token_bytes = headers
        .get("x-cas-access-token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CoreError::authorization("ACCESS_TOKEN_REQUIRED", "missing X-CAS-Access-Token header"))?
        .as_bytes()
        .to_vec();

    let node: NodeKey = req.node.parse::<IdNodeKey>()?;

    let outcome = claim(&state.store, &state.ownership, &delegate, &acting_token, &access_token_bytes, node, &req.pop).await?;
    Ok(Json(ClaimResponse { already_owned: outcome.already_owned }))
}
