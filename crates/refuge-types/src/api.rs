use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, Role, Ticket, TicketStatus};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: Uuid,
    pub role: Role,
    /// True for privileged identities: the session stays locked until the
    /// step-up PIN is verified.
    pub step_up_required: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinRequest {
    pub pin: String,
}

// -- Reports & chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitReportRequest {
    pub body: String,
    #[serde(default)]
    pub accept_terms: bool,
    /// Handle returned by a prior attachment upload.
    pub attachment_id: Option<String>,
    /// Inline recorded clip as a `data:audio/...;base64,` URI.
    pub audio: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitReportResponse {
    pub protocol: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub text: Option<String>,
    pub attachment_id: Option<String>,
    pub audio: Option<String>,
}

/// Ticket as shown to the reporter: the internal note is withheld.
#[derive(Debug, Serialize, Deserialize)]
pub struct TicketView {
    pub protocol: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Ticket> for TicketView {
    fn from(ticket: &Ticket) -> Self {
        TicketView {
            protocol: ticket.protocol.clone(),
            status: ticket.status,
            created_at: ticket.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub ticket: TicketView,
    pub messages: Vec<ChatMessage>,
}

// -- Review surface --

/// Ticket as shown to reviewers, including the internal note.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewTicketView {
    pub protocol: String,
    pub body: String,
    pub status: TicketStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Ticket> for ReviewTicketView {
    fn from(ticket: &Ticket) -> Self {
        ReviewTicketView {
            protocol: ticket.protocol.clone(),
            body: ticket.body.clone(),
            status: ticket.status,
            note: ticket.note.clone(),
            created_at: ticket.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardResponse {
    /// Newest tickets first.
    pub tickets: Vec<ReviewTicketView>,
    /// protocol -> count of reporter messages not yet acknowledged.
    pub unread: HashMap<String, i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewThreadResponse {
    pub ticket: ReviewTicketView,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetNoteRequest {
    pub note: String,
}
