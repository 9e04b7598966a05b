use tracing::{debug, warn};

use duet_crypto::{CredentialService, validate_password};
use duet_db::Database;
use duet_types::models::{Credential, Message, MessageKind, MessageMetadata, NewMessage};
use duet_types::{Error, Result};

use crate::pagination::PageWindow;

/// Longest username accepted, in characters.
pub const MAX_USERNAME_LEN: usize = 10;

/// The synchronous call surface the HTTP handlers sit on.
///
/// Owns its storage and hashing dependencies; nothing here is global, so each
/// test can build its own service over an in-memory database.
pub struct ChatService {
    db: Database,
    credentials: CredentialService,
}

impl ChatService {
    pub fn new(db: Database, credentials: CredentialService) -> Self {
        Self { db, credentials }
    }

    // -- Accounts --

    pub fn create_account(&self, username: &str, password: &str) -> Result<i64> {
        validate_username(username)?;
        validate_password(password)?;

        if self.db.account_exists(username)? {
            return Err(Error::Conflict(format!("username {} is taken", username)));
        }

        let credential = self.credentials.derive(password)?;
        self.db.create_account(username, &credential)
    }

    pub fn account_exists(&self, username: &str) -> Result<bool> {
        self.db.account_exists(username)
    }

    pub fn get_credential(&self, username: &str) -> Result<Credential> {
        self.db.get_credential(username)
    }

    /// Check a password for `username`. No session is created.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        let credential = self.db.get_credential(username)?;
        let verified = self
            .credentials
            .verify(password, &credential.hash, &credential.salt)?;

        if !verified {
            warn!("Rejected password for {}", username);
        }
        Ok(verified)
    }

    // -- Messages --

    /// Validate and store a message. `metadata` may be omitted for link
    /// messages, in which case placeholder metadata is stored.
    pub fn send_message(
        &self,
        sender: &str,
        recipient: &str,
        message_type: &str,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<i64> {
        let kind: MessageKind = message_type.parse()?;
        let message = NewMessage::new(kind, content, metadata)?;

        self.db.add_message(sender, recipient, &message)
    }

    /// The conversation between two users in send order, optionally cut down
    /// to one page. The two usernames are interchangeable.
    pub fn fetch_conversation(
        &self,
        first: &str,
        second: &str,
        page_size: Option<i64>,
        page_index: Option<i64>,
    ) -> Result<Vec<Message>> {
        let window = PageWindow::from_parts(page_size, page_index)?;
        let messages = self.db.fetch_conversation(first, second)?;

        match window {
            Some(window) => {
                let page = window.apply(messages)?;
                debug!("Returning {} messages for {:?}", page.len(), window);
                Ok(page)
            }
            None => Ok(messages),
        }
    }
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if len == 0 || len > MAX_USERNAME_LEN {
        return Err(Error::Validation(format!(
            "username should be between 1 and {} characters",
            MAX_USERNAME_LEN
        )));
    }
    Ok(())
}
