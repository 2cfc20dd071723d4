//! Ticket. A short-lived, realm-scoped named workspace
//! associated with an access token. Creation never touches the CAS graph.

use std::sync::Arc;

use crate::codec::NodeKey;
use crate::common::error::CoreError;
use crate::ids::TicketId;
use crate::store::{MetadataStore, Precondition};

const TICKET_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Submitted,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub realm: String,
    pub name: String,
    pub access_token_id: String,
    pub status: TicketStatus,
    pub submitted_root: Option<NodeKey>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl Ticket {
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.expires_at
    }
}

fn storage_key(realm: &str, id: &TicketId) -> String {
    format!("ticket#{realm}#{id}")
}

pub struct TicketStore {
    metadata: Arc<dyn MetadataStore>,
}

impl TicketStore {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    pub async fn create(
        &self,
        ticket_id: TicketId,
        realm: &str,
        name: &str,
        access_token_id: &str,
    ) -> Result<Ticket, CoreError> {
        let now = chrono::Utc::now();
        let ticket = Ticket {
            ticket_id,
            realm: realm.to_string(),
            name: name.to_string(),
            access_token_id: access_token_id.to_string(),
            status: TicketStatus::Pending,
            submitted_root: None,
            created_at: now,
            expires_at: now + chrono::Duration::hours(TICKET_TTL_HOURS),
        };
        let bytes = serde_json::to_vec(&ticket).map_err(|e| CoreError::internal(e.to_string()))?;
        self.metadata.put_if(&storage_key(realm, &ticket_id), bytes, Precondition::Absent).await?;
        Ok(ticket)
    }

    pub async fn get(&self, realm: &str, ticket_id: &TicketId) -> Result<Ticket, CoreError> {
        let bytes = self
            .metadata
            .get(&storage_key(realm, ticket_id))
            .await?
            .ok_or_else(|| CoreError::not_found("TICKET_NOT_FOUND", ticket_id.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| CoreError::internal(e.to_string()))
    }

    pub async fn submit(&self, realm: &str, ticket_id: &TicketId, root: NodeKey) -> Result<Ticket, CoreError> {
        let mut ticket = self.get(realm, ticket_id).await?;
        if ticket.is_expired(chrono::Utc::now()) {
            return Err(CoreError::validation("TICKET_EXPIRED", "ticket has expired"));
        }
        let old_bytes = serde_json::to_vec(&ticket).map_err(|e| CoreError::internal(e.to_string()))?;
        ticket.status = TicketStatus::Submitted;
        ticket.submitted_root = Some(root);
        let new_bytes = serde_json::to_vec(&ticket).map_err(|e| CoreError::internal(e.to_string()))?;
        self.metadata
            .put_if(&storage_key(realm, ticket_id), new_bytes, Precondition::Equals(old_bytes))
            .await?;
        Ok(ticket)
    }
}
