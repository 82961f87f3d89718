use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            display_name    TEXT,
            email           TEXT
        );

        -- Append-only. created_at stays NULL until the write is stamped.
        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL,
            sender_name     TEXT NOT NULL,
            receiver_id     TEXT NOT NULL,
            participants    TEXT NOT NULL,
            message         TEXT NOT NULL,
            created_at      TEXT,
            is_read         INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
