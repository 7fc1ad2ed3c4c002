use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Lifecycle state of a ticket. Closed tickets reject new reporter-authored
/// messages; reviewers may still append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Received,
    InProgress,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Received => "received",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "received" => Ok(TicketStatus::Received),
            "in_progress" => Ok(TicketStatus::InProgress),
            "closed" => Ok(TicketStatus::Closed),
            other => Err(Error::validation(format!("unknown status '{other}'"))),
        }
    }
}

/// Who authored a chat message. Never a real identity; tickets are resumed
/// by protocol code alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    Reporter,
    Reviewer,
}

impl AuthorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorRole::Reporter => "reporter",
            AuthorRole::Reviewer => "reviewer",
        }
    }
}

impl FromStr for AuthorRole {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "reporter" => Ok(AuthorRole::Reporter),
            "reviewer" => Ok(AuthorRole::Reviewer),
            other => Err(Error::validation(format!("unknown author role '{other}'"))),
        }
    }
}

/// Role derived from allow-list membership at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Reporter,
    Reviewer,
    Administrator,
}

impl Role {
    /// Privileged roles must additionally pass the step-up PIN challenge.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Reviewer | Role::Administrator)
    }
}

/// An authenticated identity: the normalized email plus its derived role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    /// User-facing random code, stored normalized upper-case. The only
    /// credential needed to resume a conversation.
    pub protocol: String,
    pub body: String,
    pub status: TicketStatus,
    /// Reviewer-only annotation, never surfaced to the reporter.
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_role: AuthorRole,
    pub text: Option<String>,
    pub attachment: Option<String>,
    pub seen_by_reviewer: bool,
    pub created_at: DateTime<Utc>,
}
