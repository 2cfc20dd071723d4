//! Depot registry routes. 
use axum::extract::{Path, State};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::ActingDelegate;
use crate::api::server::SharedAppState;
use crate::codec::NodeKey;
use crate::common::error::Result;
use crate::ids::{DepotId, NodeKey as IdNodeKey};

fn random_id_bytes() -> [u8; 16] {
    *uuid::Uuid::new_v4().as_bytes()
}

pub fn router() -> Router<SharedAppState> {
    Router::new()
        .route("/v1/depots", axum::routing::post(create))
        .route("/v1/depots/by-name/:name", axum::routing::get(get_by_name))
        .route("/v1/depots/:id", axum::routing::get(get).patch(update).delete(delete))
        .route("/v1/depots/:id/commit", axum::routing::post(commit))
}

#[derive(Serialize)]
struct DepotResponse {
    depot_id: String,
    realm: String,
    name: String,
    root: String,
    max_history: u32,
    history_len: usize,
}

impl From<crate::depot::Depot> for DepotResponse {
    fn from(d: crate::depot::Depot) -> Self {
        Self {
            depot_id: d.depot_id.to_string(),
            realm: d.realm,
            name: d.name,
            root: d.root.to_string(),
            max_history: d.max_history,
            history_len: d.history.len(),
        }
    }
}

#[derive(Deserialize)]
struct CreateRequest {
    name: String,
    initial_root: String,
    max_history: u32,
}

async fn create(
    State(state): State<SharedAppState>,
    ActingDelegate(delegate): ActingDelegate,
    Json(req): Json<CreateRequest>,
) -> Result<Json<DepotResponse>> {
    let initial_root: NodeKey = req.initial_root.parse::<IdNodeKey>()?;
    let depot_id = DepotId::from_bytes(random_id_bytes());
    let depot = state
        .depots
        .create(&delegate.realm, depot_id, &req.name, initial_root, req.max_history, &delegate.delegate_id.to_string(), "")
        .await?;
    Ok(Json(depot.into()))
}

async fn get(
    State(state): State<SharedAppState>,
    ActingDelegate(delegate): ActingDelegate,
    Path(id): Path<String>,
) -> Result<Json<DepotResponse>> {
    let depot_id: DepotId = id.parse()?;
    let depot = state.depots.get(&delegate.realm, &depot_id).await?;
    Ok(Json(depot.into()))
}

async fn get_by_name(
    State(state): State<SharedAppState>,
    ActingDelegate(delegate): ActingDelegate,
    Path(name): Path<String>,
) -> Result<Json<DepotResponse>> {
    let depot = state.depots.get_by_name(&delegate.realm, &name).await?;
    Ok(Json(depot.into()))
}

#[derive(Deserialize)]
struct CommitRequest {
    new_root: String,
    #[serde(default)]
    expected_root: Option<String>,
    #[serde(default)]
    diff: Option<String>,
}

async fn commit(
    State(state): State<SharedAppState>,
    ActingDelegate(delegate): ActingDelegate,
    Path(id): Path<String>,
    Json(req): Json<CommitRequest>,
) -> Result<Json<DepotResponse>> {
    let depot_id: DepotId = id.parse()?;
    let new_root: NodeKey = req.new_root.parse::<IdNodeKey>()?;
    let expected_root = req.expected_root.map(|r| r.parse::<IdNodeKey>()).transpose()?;
    let depot = state.depots.commit(&delegate.realm, &depot_id, new_root, expected_root, req.diff).await?;
    Ok(Json(depot.into()))
}

#[derive(Deserialize)]
struct UpdateRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    max_history: Option<u32>,
}

async fn update(
    State(state): State<SharedAppState>,
    ActingDelegate(delegate): ActingDelegate,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<DepotResponse>> {
    let depot_id: DepotId = id.parse()?;
    let depot = state.depots.update(&delegate.realm, &depot_id, req.name, req.max_history).await?;
    Ok(Json(depot.into()))
}

async fn delete(
    State(state): State<SharedAppState>,
    ActingDelegate(delegate): ActingDelegate,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode> {
    let depot_id: DepotId = id.parse()?;
    state.depots.delete(&delegate.realm, &depot_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
