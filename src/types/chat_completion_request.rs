use serde::{Deserialize, Serialize};

use crate::types::{Model, Role};

/// One turn of conversation history as sent to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    /// Author of the turn.
    pub role: Role,
    /// Text of the turn.
    pub content: String,
}

impl ApiMessage {
    /// Create a new `ApiMessage`.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Body of a POST to `chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model to route the request to.
    pub model: Model,
    /// Conversation history, oldest first.
    pub messages: Vec<ApiMessage>,
    /// Whether the response is streamed as server-sent events.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// A request answered with a server-sent event stream.
    pub fn streaming(model: Model, messages: Vec<ApiMessage>) -> Self {
        Self {
            model,
            messages,
            stream: true,
        }
    }

    /// A request answered with a single JSON body.
    pub fn non_streaming(model: Model, messages: Vec<ApiMessage>) -> Self {
        Self {
            model,
            messages,
            stream: false,
        }
    }
}
