use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::Message;

/// Unique identifier of a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A titled conversation.  The session owns its messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// Display title.
    pub title: String,
    /// Turns in order.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Creation time.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
    /// Last time the title or messages changed.
    #[serde(with = "crate::utils::time")]
    pub updated_at: OffsetDateTime,
}

impl Session {
    /// Create an empty session.
    pub fn new(title: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: SessionId::generate(),
            title: title.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a modification.
    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Case-insensitive match against the title or any message content.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&query)
            || self
                .messages
                .iter()
                .any(|message| message.content.to_lowercase().contains(&query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageDraft;
    use serde_json::to_value;

    #[test]
    fn timestamps_serialize_as_text() {
        let session = Session::new("Greetings");
        let value = to_value(&session).unwrap();
        assert!(value["createdAt"].is_string());
        assert!(value["updatedAt"].is_string());
        assert_eq!(value["title"], "Greetings");
    }

    #[test]
    fn matches_title_and_content() {
        let mut session = Session::new("Rust questions");
        session
            .messages
            .push(Message::from_draft(MessageDraft::user("What is a Borrow checker?")));
        assert!(session.matches("rust"));
        assert!(session.matches("BORROW"));
        assert!(session.matches("   "));
        assert!(!session.matches("python"));
    }
}
