use rusqlite::{Connection, params};
use tracing::{debug, info, warn};

use duet_types::models::{Credential, Message, MessageKind, MessageMetadata, NewMessage};
use duet_types::{Error, Result};

use crate::models::MessageRow;
use crate::{Database, StorageExt};

impl Database {
    // -- Accounts --

    /// Insert an account and return its id.
    ///
    /// Callers check [`Database::account_exists`] first for a clean error,
    /// but the `UNIQUE` constraint on `username_key` is what actually rejects
    /// a duplicate; two racing signups get `Conflict` here, not a 500.
    pub fn create_account(&self, username: &str, credential: &Credential) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, username_key, hash, salt) VALUES (?1, ?2, ?3, ?4)",
                params![username, username_key(username), credential.hash, credential.salt],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref err, _)
                    if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Error::Conflict(format!("username {} is taken", username))
                }
                other => Error::Internal(format!("storage: {}", other)),
            })?;

            let id = conn.last_insert_rowid();
            info!("Account {} created with id {}", username, id);
            Ok(id)
        })
    }

    pub fn account_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username_key = ?1)",
                [username_key(username)],
                |row| row.get(0),
            )
            .storage()
        })
    }

    pub fn get_credential(&self, username: &str) -> Result<Credential> {
        self.with_conn(|conn| {
            query_credential(conn, username)?.ok_or_else(|| Error::no_such_user(username))
        })
    }

    pub fn resolve_id(&self, username: &str) -> Result<i64> {
        self.with_conn(|conn| lookup_id(conn, username))
    }

    pub fn resolve_username(&self, id: i64) -> Result<String> {
        self.with_conn(|conn| lookup_username(conn, id))
    }

    // -- Messages --

    /// Store a validated message and return its id.
    ///
    /// For link messages the metadata row is written first and the message
    /// row references it. Both inserts share one transaction, so a failure
    /// on either leaves neither behind.
    pub fn add_message(&self, sender: &str, recipient: &str, message: &NewMessage) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let sender_id = lookup_id(conn, sender)?;
            let recipient_id = lookup_id(conn, recipient)?;

            // Dropping `tx` on any early return rolls back.
            let tx = conn.transaction().storage()?;

            let metadata_id = match message.metadata() {
                Some(meta) => Some(insert_metadata(&tx, meta)?),
                None => None,
            };

            tx.execute(
                "INSERT INTO messages (sender_id, recipient_id, message_type, content, metadata_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    sender_id,
                    recipient_id,
                    message.kind().as_str(),
                    message.content(),
                    metadata_id
                ],
            )
            .storage()?;
            let id = tx.last_insert_rowid();

            tx.commit().storage()?;

            info!(
                "Stored {} message {} from {} to {}",
                message.kind(),
                id,
                sender,
                recipient
            );
            Ok(id)
        })
    }

    /// Every message exchanged between the two users, oldest first.
    ///
    /// The argument order does not matter. Senders and recipients come back
    /// as the stored usernames rather than the caller's spelling.
    pub fn fetch_conversation(&self, first: &str, second: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let first_id = lookup_id(conn, first)?;
            let second_id = lookup_id(conn, second)?;

            let first_name = lookup_username(conn, first_id)?;
            let second_name = if second_id == first_id {
                first_name.clone()
            } else {
                lookup_username(conn, second_id)?
            };

            let rows = query_conversation(conn, first_id, second_id)?;
            debug!(
                "Fetched {} messages between {} and {}",
                rows.len(),
                first_name,
                second_name
            );

            rows.into_iter()
                .map(|row| {
                    decode_message(row, (first_id, &first_name), (second_id, &second_name))
                })
                .collect()
        })
    }
}

fn lookup_id(conn: &Connection, username: &str) -> Result<i64> {
    conn.query_row(
        "SELECT id FROM users WHERE username_key = ?1",
        [username_key(username)],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::no_such_user(username))
}

fn lookup_username(conn: &Connection, id: i64) -> Result<String> {
    conn.query_row("SELECT username FROM users WHERE id = ?1", [id], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("no user with id {}", id)))
}

fn query_credential(conn: &Connection, username: &str) -> Result<Option<Credential>> {
    let mut stmt = conn
        .prepare("SELECT hash, salt FROM users WHERE username_key = ?1")
        .storage()?;

    stmt.query_row([username_key(username)], |row| {
        Ok(Credential {
            hash: row.get(0)?,
            salt: row.get(1)?,
        })
    })
    .optional()
}

/// Case-folded form used for uniqueness and lookups. Full Unicode lowercase,
/// so `Émile` and `émile` are the same account.
fn username_key(username: &str) -> String {
    username.to_lowercase()
}

fn insert_metadata(conn: &Connection, meta: &MessageMetadata) -> Result<i64> {
    match meta {
        MessageMetadata::Image { width, height } => conn.execute(
            "INSERT INTO messages_metadata (width, height) VALUES (?1, ?2)",
            params![width, height],
        ),
        MessageMetadata::Video { length, source } => conn.execute(
            "INSERT INTO messages_metadata (length, source) VALUES (?1, ?2)",
            params![length, source],
        ),
    }
    .storage()?;

    Ok(conn.last_insert_rowid())
}

fn query_conversation(conn: &Connection, first_id: i64, second_id: i64) -> Result<Vec<MessageRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT m.id, m.sender_id, m.recipient_id, m.message_type, m.content,
                    md.width, md.height, md.length, md.source
             FROM messages m
             LEFT JOIN messages_metadata md ON md.id = m.metadata_id
             WHERE (m.sender_id = ?1 AND m.recipient_id = ?2)
                OR (m.sender_id = ?2 AND m.recipient_id = ?1)
             ORDER BY m.id",
        )
        .storage()?;

    let rows = stmt
        .query_map(params![first_id, second_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                recipient_id: row.get(2)?,
                message_type: row.get(3)?,
                content: row.get(4)?,
                width: row.get(5)?,
                height: row.get(6)?,
                length: row.get(7)?,
                source: row.get(8)?,
            })
        })
        .storage()?
        .collect::<std::result::Result<Vec<_>, _>>()
        .storage()?;

    Ok(rows)
}

/// Turn a joined row into a [`Message`], reading metadata columns only after
/// the type tag says which ones apply.
fn decode_message(row: MessageRow, first: (i64, &str), second: (i64, &str)) -> Result<Message> {
    let MessageRow {
        id,
        sender_id,
        recipient_id,
        message_type,
        content,
        width,
        height,
        length,
        source,
    } = row;

    let name_of = |user_id: i64| {
        if user_id == first.0 {
            first.1.to_string()
        } else {
            second.1.to_string()
        }
    };

    let kind: MessageKind = message_type
        .parse()
        .map_err(|_| corrupt(id, &format!("unknown message_type {}", message_type)))?;

    let metadata = match kind {
        MessageKind::Plaintext => None,
        MessageKind::ImageLink => match (width, height) {
            (Some(width), Some(height)) => Some(MessageMetadata::Image { width, height }),
            _ => return Err(corrupt(id, "image metadata missing")),
        },
        MessageKind::VideoLink => match (length, source) {
            (Some(length), Some(source)) => Some(MessageMetadata::Video { length, source }),
            _ => return Err(corrupt(id, "video metadata missing")),
        },
    };

    Ok(Message {
        id,
        sender: name_of(sender_id),
        recipient: name_of(recipient_id),
        message_type: kind,
        content,
        metadata,
    })
}

fn corrupt(id: i64, what: &str) -> Error {
    warn!("Corrupt message row {}: {}", id, what);
    Error::Internal(format!("message {} is corrupt: {}", id, what))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            hash: b"$argon2id$placeholder".to_vec(),
            salt: vec![7; 16],
        }
    }

    fn db_with_users(names: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for name in names {
            db.create_account(name, &credential()).unwrap();
        }
        db
    }

    fn plaintext(content: &str) -> NewMessage {
        NewMessage::new(MessageKind::Plaintext, content, None).unwrap()
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
                .storage()
        })
        .unwrap()
    }

    #[test]
    fn account_exists_ignores_case() {
        let db = db_with_users(&["Alice"]);

        assert!(db.account_exists("Alice").unwrap());
        assert!(db.account_exists("alice").unwrap());
        assert!(db.account_exists("ALICE").unwrap());
        assert!(!db.account_exists("bob").unwrap());
    }

    #[test]
    fn duplicate_username_is_conflict() {
        let db = db_with_users(&["alice"]);

        let err = db.create_account("alice", &credential()).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = db.create_account("ALICE", &credential()).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(count(&db, "users"), 1);
    }

    #[test]
    fn non_ascii_usernames_fold_case() {
        let db = db_with_users(&["Émile"]);

        assert!(db.account_exists("émile").unwrap());
        assert!(db.account_exists("ÉMILE").unwrap());
        assert_eq!(db.resolve_id("émile").unwrap(), db.resolve_id("Émile").unwrap());
        assert_eq!(db.get_credential("émile").unwrap(), credential());

        let err = db.create_account("émile", &credential()).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(count(&db, "users"), 1);
    }

    #[test]
    fn credential_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let cred = Credential {
            hash: b"$argon2id$v=19$stored".to_vec(),
            salt: vec![1, 2, 3, 4],
        };
        db.create_account("alice", &cred).unwrap();

        assert_eq!(db.get_credential("alice").unwrap(), cred);
        assert_eq!(db.get_credential("Alice").unwrap(), cred);
        assert!(matches!(db.get_credential("bob"), Err(Error::NotFound(_))));
    }

    #[test]
    fn resolve_both_ways() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_account("Alice", &credential()).unwrap();

        assert_eq!(db.resolve_id("alice").unwrap(), id);
        assert_eq!(db.resolve_username(id).unwrap(), "Alice");
        assert!(matches!(db.resolve_id("ghost"), Err(Error::NotFound(_))));
        assert!(matches!(db.resolve_username(id + 100), Err(Error::NotFound(_))));
    }

    #[test]
    fn plaintext_roundtrip() {
        let db = db_with_users(&["alice", "bob"]);

        let id = db.add_message("alice", "bob", &plaintext("hi bob")).unwrap();
        let messages = db.fetch_conversation("alice", "bob").unwrap();

        assert_eq!(
            messages,
            vec![Message {
                id,
                sender: "alice".into(),
                recipient: "bob".into(),
                message_type: MessageKind::Plaintext,
                content: "hi bob".into(),
                metadata: None,
            }]
        );
        assert_eq!(count(&db, "messages_metadata"), 0);
    }

    #[test]
    fn link_messages_carry_metadata() {
        let db = db_with_users(&["alice", "bob"]);

        let image = NewMessage::new(
            MessageKind::ImageLink,
            "http://example.com/cat.png",
            Some(MessageMetadata::Image { width: 640, height: 480 }),
        )
        .unwrap();
        let video = NewMessage::new(MessageKind::VideoLink, "http://example.com/v", None).unwrap();

        db.add_message("alice", "bob", &image).unwrap();
        db.add_message("bob", "alice", &video).unwrap();

        let messages = db.fetch_conversation("alice", "bob").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0].metadata,
            Some(MessageMetadata::Image { width: 640, height: 480 })
        );
        assert_eq!(messages[1].message_type, MessageKind::VideoLink);
        assert_eq!(
            messages[1].metadata,
            Some(MessageMetadata::Video { length: 300, source: "YouTube".into() })
        );
        assert_eq!(messages[1].sender, "bob");
        assert_eq!(messages[1].recipient, "alice");
        assert_eq!(count(&db, "messages_metadata"), 2);
    }

    #[test]
    fn order_is_send_order_from_either_side() {
        let db = db_with_users(&["alice", "bob"]);

        let m1 = db.add_message("alice", "bob", &plaintext("one")).unwrap();
        let m2 = db.add_message("bob", "alice", &plaintext("two")).unwrap();
        let m3 = db.add_message("alice", "bob", &plaintext("three")).unwrap();
        assert!(m1 < m2 && m2 < m3);

        let forward: Vec<_> = db
            .fetch_conversation("alice", "bob")
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        let backward: Vec<_> = db
            .fetch_conversation("bob", "alice")
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();

        assert_eq!(forward, vec!["one", "two", "three"]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn conversation_excludes_other_pairs() {
        let db = db_with_users(&["alice", "bob", "carol"]);

        db.add_message("alice", "bob", &plaintext("for bob")).unwrap();
        db.add_message("alice", "carol", &plaintext("for carol")).unwrap();
        db.add_message("carol", "bob", &plaintext("carol to bob")).unwrap();

        let messages = db.fetch_conversation("bob", "alice").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "for bob");
    }

    #[test]
    fn self_messages_allowed() {
        let db = db_with_users(&["alice", "bob"]);

        db.add_message("alice", "alice", &plaintext("note to self")).unwrap();
        db.add_message("alice", "bob", &plaintext("hi")).unwrap();

        let messages = db.fetch_conversation("alice", "alice").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "alice");
        assert_eq!(messages[0].recipient, "alice");
    }

    #[test]
    fn usernames_reported_as_stored() {
        let db = db_with_users(&["Alice", "bob"]);

        db.add_message("ALICE", "BOB", &plaintext("hi")).unwrap();

        let messages = db.fetch_conversation("alice", "Bob").unwrap();
        assert_eq!(messages[0].sender, "Alice");
        assert_eq!(messages[0].recipient, "bob");
    }

    #[test]
    fn unknown_sender_writes_nothing() {
        let db = db_with_users(&["user1"]);

        let image = NewMessage::new(MessageKind::ImageLink, "http://img", None).unwrap();
        let err = db.add_message("ghost", "user1", &image).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m.contains("ghost")));

        let err = db.add_message("ghost", "user1", &plaintext("hi")).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m.contains("ghost")));

        assert_eq!(count(&db, "messages"), 0);
        assert_eq!(count(&db, "messages_metadata"), 0);
    }

    #[test]
    fn unknown_recipient_is_named() {
        let db = db_with_users(&["user1"]);

        let err = db.add_message("user1", "nobody", &plaintext("hi")).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m.contains("nobody")));

        let err = db.fetch_conversation("user1", "nobody").unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m.contains("nobody")));
    }

    #[test]
    fn failed_message_insert_rolls_back_metadata() {
        let db = db_with_users(&["alice", "bob"]);

        // Make the second insert of the pair fail after the metadata row is written.
        db.with_conn_mut(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_message_insert BEFORE INSERT ON messages
                 BEGIN SELECT RAISE(ABORT, 'simulated storage failure'); END;",
            )
            .storage()
        })
        .unwrap();

        let video = NewMessage::new(MessageKind::VideoLink, "http://vid", None).unwrap();
        let err = db.add_message("alice", "bob", &video).unwrap_err();
        assert!(matches!(err, Error::Internal(ref m) if m.contains("simulated storage failure")));

        assert_eq!(count(&db, "messages"), 0);
        assert_eq!(count(&db, "messages_metadata"), 0);

        // The connection is still usable once the trigger is gone.
        db.with_conn_mut(|conn| conn.execute_batch("DROP TRIGGER fail_message_insert").storage())
            .unwrap();
        db.add_message("alice", "bob", &video).unwrap();
        assert_eq!(count(&db, "messages"), 1);
        assert_eq!(count(&db, "messages_metadata"), 1);
    }

    #[test]
    fn missing_metadata_columns_are_internal_error() {
        let db = db_with_users(&["alice", "bob"]);

        // An image message whose metadata row only has video columns.
        db.with_conn_mut(|conn| {
            conn.execute_batch(
                "INSERT INTO messages_metadata (id, length, source) VALUES (1, 5, 'x');
                 INSERT INTO messages (sender_id, recipient_id, message_type, content, metadata_id)
                 VALUES (1, 2, 'image_link', 'http://img', 1);",
            )
            .storage()
        })
        .unwrap();

        let err = db.fetch_conversation("alice", "bob").unwrap_err();
        assert!(matches!(err, Error::Internal(ref m) if m.contains("image metadata missing")));
    }

    #[test]
    fn plaintext_with_metadata_refused_by_schema() {
        let db = db_with_users(&["alice", "bob"]);

        let result = db.with_conn_mut(|conn| {
            conn.execute_batch(
                "INSERT INTO messages_metadata (id, width, height) VALUES (1, 1, 1);
                 INSERT INTO messages (sender_id, recipient_id, message_type, content, metadata_id)
                 VALUES (1, 2, 'plaintext', 'hi', 1);",
            )
            .storage()
        });
        assert!(result.is_err());
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duet.db");

        {
            let db = Database::open(&path).unwrap();
            db.create_account("alice", &credential()).unwrap();
            db.create_account("bob", &credential()).unwrap();
            db.add_message("alice", "bob", &plaintext("persisted")).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let messages = db.fetch_conversation("alice", "bob").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "persisted");
        assert_eq!(count(&db, "schema_version"), 1);
    }
}
