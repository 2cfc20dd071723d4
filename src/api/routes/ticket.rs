//! Ticket routes. 
use axum::extract::{Path, State};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::ActingDelegate;
use crate::api::server::SharedAppState;
use crate::codec::NodeKey;
use crate::common::error::Result;
use crate::ids::{NodeKey as IdNodeKey, TicketId};
use crate::ticket::TicketStatus;

pub fn router() -> Router<SharedAppState> {
    Router::new()
        .route("/v1/tickets", axum::routing::post(create))
        .route("/v1/tickets/:id", axum::routing::get(get))
        .route("/v1/tickets/:id/submit", axum::routing::post(submit))
}

#[derive(Serialize)]
struct TicketResponse {
    ticket_id: String,
    realm: String,
    name: String,
    status: TicketStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    submitted_root: Option<String>,
    expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::ticket::Ticket> for TicketResponse {
    fn from(t: crate::ticket::Ticket) -> Self {
        Self {
            ticket_id: t.ticket_id.to_string(),
            realm: t.realm,
            name: t.name,
            status: t.status,
            submitted_root: t.submitted_root.map(|r| r.to_string()),
            expires_at: t.expires_at,
        }
    }
}

#[derive(Deserialize)]
struct CreateRequest {
    name: String,
}

async fn create(
    State(state): State<SharedAppState>,
    ActingDelegate(delegate): ActingDelegate,
    Json(req): Json<CreateRequest>,
) -> Result<Json<TicketResponse>> {
    let ticket_id = TicketId::from_bytes(*uuid::Uuid::new_v4().as_bytes());
    let ticket = state
        .tickets
        .create(ticket_id, &delegate.realm, &req.name, &delegate.delegate_id.to_string())
        .await?;
    Ok(Json(ticket.into()))
}

async fn get(
    State(state): State<SharedAppState>,
    ActingDelegate(delegate): ActingDelegate,
    Path(id): Path<String>,
) -> Result<Json<TicketResponse>> {
    let ticket_id: TicketId = id.parse()?;
    let ticket = state.tickets.get(&delegate.realm, &ticket_id).await?;
    Ok(Json(ticket.into()))
}

#[derive(Deserialize)]
struct SubmitRequest {
    root: String,
}

async fn submit(
    State(state): State<SharedAppState>,
    ActingDelegate(delegate): ActingDelegate,
    Path(id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<TicketResponse>> {
    let ticket_id: TicketId = id.parse()?;
    let root: NodeKey = req.root.parse::<IdNodeKey>()?;
    let ticket = state.tickets.submit(&delegate.realm, &ticket_id, root).await?;
    Ok(Json(ticket.into()))
}
