use rusqlite::Connection;
use tracing::info;

use duet_types::Result;

use crate::StorageExt;

pub const SCHEMA_VERSION: i64 = 1;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")
        .storage()?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
        .storage()?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL,
                -- Lowercased username; uniqueness and lookups go through this.
                username_key TEXT NOT NULL UNIQUE,
                hash        BLOB NOT NULL,
                salt        BLOB NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Image rows fill width/height, video rows fill length/source.
            CREATE TABLE messages_metadata (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                width   INTEGER,
                height  INTEGER,
                length  INTEGER,
                source  TEXT
            );

            -- AUTOINCREMENT: ids are never reused, so id order is send order.
            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id       INTEGER NOT NULL REFERENCES users(id),
                recipient_id    INTEGER NOT NULL REFERENCES users(id),
                message_type    TEXT NOT NULL
                    CHECK (message_type IN ('plaintext', 'image_link', 'video_link')),
                content         TEXT NOT NULL CHECK (length(content) > 0),
                metadata_id     INTEGER REFERENCES messages_metadata(id),
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK ((message_type = 'plaintext') = (metadata_id IS NULL))
            );

            CREATE INDEX idx_messages_pair
                ON messages(sender_id, recipient_id, id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )
        .storage()?;
    }

    info!("Database migrations complete (schema v{})", SCHEMA_VERSION);
    Ok(())
}
