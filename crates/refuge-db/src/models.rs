//! Database row types — these map directly to SQLite rows.
//! Distinct from the refuge-types API models to keep the DB layer
//! independent of serialization concerns.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use refuge_types::models::{AuthorRole, ChatMessage, Ticket, TicketStatus};
use tracing::warn;
use uuid::Uuid;

pub struct TicketRow {
    pub id: String,
    pub protocol: String,
    pub body: String,
    pub status: String,
    pub note: Option<String>,
    pub created_at: String,
}

impl TicketRow {
    pub fn into_ticket(self) -> Ticket {
        Ticket {
            id: parse_uuid(&self.id, "ticket id"),
            status: TicketStatus::from_str(&self.status).unwrap_or_else(|e| {
                warn!("Corrupt status '{}' on ticket '{}': {}", self.status, self.id, e);
                TicketStatus::Received
            }),
            created_at: parse_timestamp(&self.created_at, &self.id),
            protocol: self.protocol,
            body: self.body,
            note: self.note,
        }
    }
}

pub struct MessageRow {
    pub id: String,
    pub ticket_id: String,
    pub author_role: String,
    pub text: Option<String>,
    pub attachment: Option<String>,
    pub seen_by_reviewer: bool,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            id: parse_uuid(&self.id, "message id"),
            ticket_id: parse_uuid(&self.ticket_id, "ticket_id"),
            author_role: AuthorRole::from_str(&self.author_role).unwrap_or_else(|e| {
                warn!(
                    "Corrupt author_role '{}' on message '{}': {}",
                    self.author_role, self.id, e
                );
                AuthorRole::Reporter
            }),
            created_at: parse_timestamp(&self.created_at, &self.id),
            text: self.text,
            attachment: self.attachment,
            seen_by_reviewer: self.seen_by_reviewer,
        }
    }
}

fn parse_uuid(value: &str, what: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, value, e);
        Uuid::default()
    })
}

fn parse_timestamp(value: &str, row_id: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            // Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on row '{}': {}", value, row_id, e);
            DateTime::default()
        })
}
