use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{ApiMessage, Attachment, Role};

/// Unique identifier of a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A single turn in a conversation.
///
/// Messages are created by the store, which assigns the id and timestamp.  After that only
/// `content` and the stopped flag change, and only through a [`MessagePatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Author of the turn.
    pub role: Role,
    /// Text of the turn.
    pub content: String,
    /// When the store accepted the message.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,
    /// Files that rode along with a user turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    /// Set when generation of this turn was interrupted or superseded by a redo.
    #[serde(
        rename = "isStopped",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stopped: Option<bool>,
}

impl Message {
    /// Materialize a draft with a fresh id and the current time.
    pub fn from_draft(draft: MessageDraft) -> Self {
        let MessageDraft {
            role,
            content,
            attachments,
        } = draft;
        Self {
            id: MessageId::generate(),
            role,
            content,
            timestamp: OffsetDateTime::now_utc(),
            attachments: if attachments.is_empty() {
                None
            } else {
                Some(attachments)
            },
            stopped: None,
        }
    }

    /// True when this message was flagged as stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.unwrap_or(false)
    }

    /// The attachments, or an empty slice.
    pub fn attachments(&self) -> &[Attachment] {
        self.attachments.as_deref().unwrap_or(&[])
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: MessagePatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(stopped) = patch.stopped {
            self.stopped = Some(stopped);
        }
    }

    /// Project onto the wire shape.
    pub fn to_api_message(&self) -> ApiMessage {
        ApiMessage::new(self.role, self.content.clone())
    }
}

/// A message before the store has given it an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    /// Author of the turn.
    pub role: Role,
    /// Text of the turn.
    pub content: String,
    /// Files attached to the turn.
    pub attachments: Vec<Attachment>,
}

impl MessageDraft {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// Attach files to the turn.
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// A partial update to a stored message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    /// Replacement content.
    pub content: Option<String>,
    /// Replacement stopped flag.
    pub stopped: Option<bool>,
}

impl MessagePatch {
    /// Replace the content.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            stopped: None,
        }
    }

    /// Flag the message as stopped.
    pub fn stopped() -> Self {
        Self {
            content: None,
            stopped: Some(true),
        }
    }
}
