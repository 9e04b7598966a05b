use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest message body accepted, in bytes.
pub const MAX_CONTENT_LEN: usize = 255;

// Placeholder metadata for links sent without any.
const IMAGE_WIDTH: u32 = 100;
const IMAGE_HEIGHT: u32 = 200;
const VIDEO_LENGTH: u32 = 300;
const VIDEO_SOURCE: &str = "YouTube";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Plaintext,
    ImageLink,
    VideoLink,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Plaintext => "plaintext",
            MessageKind::ImageLink => "image_link",
            MessageKind::VideoLink => "video_link",
        }
    }

    /// Metadata stored for a message of this kind when the sender gave none.
    pub fn default_metadata(self) -> Option<MessageMetadata> {
        match self {
            MessageKind::Plaintext => None,
            MessageKind::ImageLink => Some(MessageMetadata::Image {
                width: IMAGE_WIDTH,
                height: IMAGE_HEIGHT,
            }),
            MessageKind::VideoLink => Some(MessageMetadata::Video {
                length: VIDEO_LENGTH,
                source: VIDEO_SOURCE.to_string(),
            }),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plaintext" => Ok(MessageKind::Plaintext),
            "image_link" => Ok(MessageKind::ImageLink),
            "video_link" => Ok(MessageKind::VideoLink),
            other => Err(Error::Validation(format!("invalid messageType {}", other))),
        }
    }
}

/// Type-specific payload of a link message. Serialized without a tag: the
/// owning message's `messageType` already says which variant it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageMetadata {
    Image { width: u32, height: u32 },
    Video { length: u32, source: String },
}

impl MessageMetadata {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageMetadata::Image { .. } => MessageKind::ImageLink,
            MessageMetadata::Video { .. } => MessageKind::VideoLink,
        }
    }
}

/// A stored message as readers see it, with both parties named by username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub message_type: MessageKind,
    pub content: String,
    pub metadata: Option<MessageMetadata>,
}

/// A message that passed validation and can be handed to storage.
///
/// The only way to build one is [`NewMessage::new`], so storage never sees
/// empty content or metadata that disagrees with the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    kind: MessageKind,
    content: String,
    metadata: Option<MessageMetadata>,
}

impl NewMessage {
    pub fn new(
        kind: MessageKind,
        content: impl Into<String>,
        metadata: Option<MessageMetadata>,
    ) -> Result<Self> {
        let content = content.into();
        if content.is_empty() {
            return Err(Error::Validation("rejecting empty message".into()));
        }
        if content.len() > MAX_CONTENT_LEN {
            return Err(Error::Validation(format!(
                "message content is {} bytes, limit is {}",
                content.len(),
                MAX_CONTENT_LEN
            )));
        }

        let metadata = match (kind, metadata) {
            (MessageKind::Plaintext, Some(_)) => {
                return Err(Error::Validation(
                    "plaintext messages carry no metadata".into(),
                ));
            }
            (kind, Some(meta)) if meta.kind() != kind => {
                return Err(Error::Validation(format!(
                    "{} metadata does not match messageType {}",
                    meta.kind(),
                    kind
                )));
            }
            (_, Some(meta)) => Some(meta),
            (kind, None) => kind.default_metadata(),
        };

        Ok(Self {
            kind,
            content,
            metadata,
        })
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> Option<&MessageMetadata> {
        self.metadata.as_ref()
    }
}

/// Password material stored for one account. The salt is kept beside the
/// hash so verification only needs (password, hash, salt).
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub hash: Vec<u8>,
    pub salt: Vec<u8>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("hash_len", &self.hash.len())
            .field("salt_len", &self.salt.len())
            .finish()
    }
}
