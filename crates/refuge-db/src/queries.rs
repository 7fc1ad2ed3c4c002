use std::collections::HashMap;

use rand::Rng;
use refuge_types::models::{AuthorRole, ChatMessage, Ticket, TicketStatus};
use refuge_types::Error;
use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

use crate::models::{MessageRow, TicketRow};
use crate::Database;

/// Protocol codes are 4 random bytes rendered as 8 uppercase hex chars.
const PROTOCOL_BYTES: usize = 4;

/// Collisions are rare but real at this code length; the UNIQUE constraint
/// catches them and generation is retried.
const MAX_PROTOCOL_ATTEMPTS: usize = 5;

fn generate_protocol() -> String {
    let bytes: [u8; PROTOCOL_BYTES] = rand::rng().random();
    hex::encode(bytes).to_ascii_uppercase()
}

impl Database {
    // -- Tickets --

    /// Create a ticket with a freshly generated protocol. The protocol is
    /// assigned exactly once here and never user-supplied.
    pub fn create_ticket(&self, body: &str) -> Result<Ticket, Error> {
        for _ in 0..MAX_PROTOCOL_ATTEMPTS {
            let id = Uuid::new_v4();
            let protocol = generate_protocol();

            let inserted = self.with_conn(|conn| {
                match conn.execute(
                    "INSERT INTO tickets (id, protocol, body) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id.to_string(), protocol, body],
                ) {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(Error::internal(e)),
                }
            })?;

            if inserted {
                return self
                    .ticket_by_protocol(&protocol)?
                    .ok_or_else(|| Error::internal("ticket vanished after insert"));
            }
            warn!("Protocol collision on {}, regenerating", protocol);
        }

        Err(Error::internal("could not allocate a unique protocol"))
    }

    /// Case-insensitive lookup: codes are stored upper-case, so the input is
    /// normalized before comparing.
    pub fn ticket_by_protocol(&self, code: &str) -> Result<Option<Ticket>, Error> {
        let normalized = code.trim().to_ascii_uppercase();
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, protocol, body, status, note, created_at
                     FROM tickets WHERE protocol = ?1",
                )
                .map_err(Error::internal)?;

            let row = stmt
                .query_row([&normalized], |row| {
                    Ok(TicketRow {
                        id: row.get(0)?,
                        protocol: row.get(1)?,
                        body: row.get(2)?,
                        status: row.get(3)?,
                        note: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })
                .optional()?;

            Ok(row.map(TicketRow::into_ticket))
        })
    }

    /// All tickets, newest first, for the reviewer dashboard.
    pub fn list_tickets(&self) -> Result<Vec<Ticket>, Error> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, protocol, body, status, note, created_at
                     FROM tickets ORDER BY created_at DESC, rowid DESC",
                )
                .map_err(Error::internal)?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(TicketRow {
                        id: row.get(0)?,
                        protocol: row.get(1)?,
                        body: row.get(2)?,
                        status: row.get(3)?,
                        note: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })
                .map_err(Error::internal)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::internal)?;

            Ok(rows.into_iter().map(TicketRow::into_ticket).collect())
        })
    }

    /// Any valid status can replace any other; invalid values never reach
    /// this point because `TicketStatus` is parsed at the boundary.
    pub fn set_status(&self, ticket_id: Uuid, status: TicketStatus) -> Result<(), Error> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE tickets SET status = ?1 WHERE id = ?2",
                    rusqlite::params![status.as_str(), ticket_id.to_string()],
                )
                .map_err(Error::internal)?;
            if changed == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })
    }

    pub fn set_note(&self, ticket_id: Uuid, note: &str) -> Result<(), Error> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE tickets SET note = ?1 WHERE id = ?2",
                    rusqlite::params![note, ticket_id.to_string()],
                )
                .map_err(Error::internal)?;
            if changed == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })
    }

    // -- Chat thread --

    /// Append a chat turn. Rejects empty messages, and reporter messages on
    /// closed tickets; reviewers may still append there, e.g. to record
    /// closure notes. The status check and the insert run under the same
    /// connection lock.
    pub fn append_message(
        &self,
        ticket_id: Uuid,
        author_role: AuthorRole,
        text: Option<&str>,
        attachment: Option<&str>,
    ) -> Result<ChatMessage, Error> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        if text.is_none() && attachment.is_none() {
            return Err(Error::validation("a message needs text or an attachment"));
        }

        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM tickets WHERE id = ?1",
                    [ticket_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            let status = status.ok_or(Error::NotFound)?;

            if status == TicketStatus::Closed.as_str() && author_role == AuthorRole::Reporter {
                return Err(Error::validation("this ticket is closed to new messages"));
            }

            let seen = matches!(author_role, AuthorRole::Reviewer);
            conn.execute(
                "INSERT INTO messages (id, ticket_id, author_role, text, attachment, seen_by_reviewer)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    ticket_id.to_string(),
                    author_role.as_str(),
                    text,
                    attachment,
                    seen
                ],
            )
            .map_err(Error::internal)?;

            query_message_by_id(conn, &id.to_string())?
                .ok_or_else(|| Error::internal("message vanished after insert"))
        })
    }

    /// Snapshot of a ticket's thread, oldest first.
    pub fn messages_for_ticket(&self, ticket_id: Uuid) -> Result<Vec<ChatMessage>, Error> {
        self.with_conn(|conn| query_messages(conn, &ticket_id.to_string()))
    }

    /// Reviewer thread read: marks every unseen reporter message seen and
    /// returns the ordered thread in one operation, so the dashboard never
    /// shows a stale count between the load and the mark. Viewing implies
    /// acknowledging; there is no separate mark-as-read call.
    pub fn open_thread(&self, ticket_id: Uuid) -> Result<Vec<ChatMessage>, Error> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET seen_by_reviewer = 1
                 WHERE ticket_id = ?1 AND author_role = 'reporter' AND seen_by_reviewer = 0",
                [ticket_id.to_string()],
            )
            .map_err(Error::internal)?;

            query_messages(conn, &ticket_id.to_string())
        })
    }

    pub fn unread_count(&self, ticket_id: Uuid) -> Result<i64, Error> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE ticket_id = ?1 AND author_role = 'reporter' AND seen_by_reviewer = 0",
                [ticket_id.to_string()],
                |row| row.get(0),
            )
            .map_err(Error::internal)
        })
    }

    /// Unread counts for every ticket in one grouped pass (the dashboard
    /// badge query). Tickets without unread messages are absent from the map.
    pub fn unread_counts(&self) -> Result<HashMap<String, i64>, Error> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT t.protocol, COUNT(m.id)
                     FROM messages m
                     JOIN tickets t ON t.id = m.ticket_id
                     WHERE m.author_role = 'reporter' AND m.seen_by_reviewer = 0
                     GROUP BY t.protocol",
                )
                .map_err(Error::internal)?;

            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(Error::internal)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::internal)?;

            Ok(rows.into_iter().collect())
        })
    }
}

fn query_message_by_id(conn: &Connection, id: &str) -> Result<Option<ChatMessage>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT id, ticket_id, author_role, text, attachment, seen_by_reviewer, created_at
             FROM messages WHERE id = ?1",
        )
        .map_err(Error::internal)?;

    let row = stmt
        .query_row([id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                ticket_id: row.get(1)?,
                author_role: row.get(2)?,
                text: row.get(3)?,
                attachment: row.get(4)?,
                seen_by_reviewer: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row.map(MessageRow::into_message))
}

fn query_messages(conn: &Connection, ticket_id: &str) -> Result<Vec<ChatMessage>, Error> {
    // rowid breaks ties between messages created within the same second
    let mut stmt = conn
        .prepare(
            "SELECT id, ticket_id, author_role, text, attachment, seen_by_reviewer, created_at
             FROM messages WHERE ticket_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )
        .map_err(Error::internal)?;

    let rows = stmt
        .query_map([ticket_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                ticket_id: row.get(1)?,
                author_role: row.get(2)?,
                text: row.get(3)?,
                attachment: row.get(4)?,
                seen_by_reviewer: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .map_err(Error::internal)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::internal)?;

    Ok(rows.into_iter().map(MessageRow::into_message).collect())
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::internal(e)),
        }
    }
}
