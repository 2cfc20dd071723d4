//! Delegate routes. Creating a delegate always creates a
//! *child* of the acting delegate; root delegates are provisioned out of
//! band by whatever system first establishes a realm (user authentication
//! flows are out of scope here, so no route mints a root delegate).

use axum::extract::{Path, State};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::ActingDelegate;
use crate::api::server::SharedAppState;
use crate::common::error::Result;
use crate::delegate::{new_child, Capabilities, ScopeBinding};
use crate::ids::{DelegateId, NodeKey as IdNodeKey};

pub fn router() -> Router<SharedAppState> {
    Router::new()
        .route("/v1/delegates", axum::routing::post(create_child))
        .route("/v1/delegates/:id", axum::routing::get(get))
        .route("/v1/delegates/:id/revoke", axum::routing::post(revoke))
}

#[derive(Serialize)]
struct DelegateResponse {
    delegate_id: String,
    realm: String,
    depth: usize,
    can_upload: bool,
    can_manage_depot: bool,
    is_revoked: bool,
}

impl From<crate::delegate::Delegate> for DelegateResponse {
    fn from(d: crate::delegate::Delegate) -> Self {
        Self {
            delegate_id: d.delegate_id.to_string(),
            realm: d.realm.clone(),
            depth: d.depth(),
            can_upload: d.capabilities.can_upload,
            can_manage_depot: d.capabilities.can_manage_depot,
            is_revoked: d.is_revoked(),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ScopeWire {
    Node { node: String },
    Set { set: String },
}

#[derive(Deserialize)]
struct CreateChildRequest {
    can_upload: bool,
    can_manage_depot: bool,
    #[serde(default)]
    scope: Option<ScopeWire>,
}

async fn create_child(
    State(state): State<SharedAppState>,
    ActingDelegate(parent): ActingDelegate,
    Json(req): Json<CreateChildRequest>,
) -> Result<Json<DelegateResponse>> {
    let scope = match req.scope {
        None => None,
        Some(ScopeWire::Node { node }) => Some(ScopeBinding::Node(node.parse::<IdNodeKey>()?)),
        Some(ScopeWire::Set { set }) => Some(ScopeBinding::Set(set.parse::<IdNodeKey>()?)),
    };
    let capabilities = Capabilities { can_upload: req.can_upload, can_manage_depot: req.can_manage_depot };
    let child_id = DelegateId::from_bytes(*uuid::Uuid::new_v4().as_bytes());

    let child = new_child(child_id, &parent, capabilities, scope)?;
    state.delegates.create(&child).await?;
    Ok(Json(child.into()))
}

async fn get(State(state): State<SharedAppState>, Path(id): Path<String>) -> Result<Json<DelegateResponse>> {
    let delegate_id: DelegateId = id.parse()?;
    let delegate = state
        .delegates
        .get(&delegate_id)
        .await?
        .ok_or_else(|| crate::common::error::CoreError::not_found("DELEGATE_NOT_FOUND", delegate_id.to_string()))?;
    Ok(Json(delegate.into()))
}

async fn revoke(
    State(state): State<SharedAppState>,
    ActingDelegate(_acting): ActingDelegate,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode> {
    let delegate_id: DelegateId = id.parse()?;
    state.delegates.revoke(&delegate_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
