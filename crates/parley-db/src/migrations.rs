use rusqlite::Connection;
use tracing::info;

use crate::ChatError;

pub fn run(conn: &Connection) -> Result<(), ChatError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            is_group    INTEGER NOT NULL DEFAULT 0,
            title       TEXT,
            created_by  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS participants (
            conversation_id INTEGER NOT NULL REFERENCES conversations(id),
            username        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_participants_conversation
            ON participants(conversation_id, username);

        -- conversation_id NULL is the global conversation, which has no row
        -- of its own. content_encrypted is the caller's envelope, verbatim.
        CREATE TABLE IF NOT EXISTS messages (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id   INTEGER REFERENCES conversations(id),
            sender            TEXT NOT NULL,
            content_encrypted TEXT NOT NULL,
            client_token      TEXT,
            timestamp         TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, timestamp);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
