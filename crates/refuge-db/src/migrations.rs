use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tickets (
            id          TEXT PRIMARY KEY,
            protocol    TEXT NOT NULL UNIQUE,
            body        TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'received',
            note        TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id                TEXT PRIMARY KEY,
            ticket_id         TEXT NOT NULL REFERENCES tickets(id),
            author_role       TEXT NOT NULL,
            text              TEXT,
            attachment        TEXT,
            seen_by_reviewer  INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_ticket
            ON messages(ticket_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
