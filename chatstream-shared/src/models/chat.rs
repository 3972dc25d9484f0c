use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{conversation::ConversationId, timestamp::Timestamp};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Text typed by the person at the keyboard.
    User,
    /// Reply produced by the chat service.
    Assistant,
}

impl MessageRole {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl Display for MessageRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MessageRole {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err("invalid message role"),
        }
    }
}

/// A message as shown in the conversation view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Caller-generated unique identifier.
    pub id: Uuid,
    /// Message text.
    pub content: String,
    /// Who wrote the message.
    pub role: MessageRole,
    /// When the message was created on the client.
    pub timestamp: Timestamp,
}

impl ChatMessage {
    /// Creates a message with a fresh id and the current time.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            role,
            timestamp: Timestamp::now(),
        }
    }

    /// Shorthand for a user-authored message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Shorthand for an assistant-authored message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Request body shared by the streaming and non-streaming chat endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Correlation token; the server assigns one when absent.
    pub conversation_id: Option<ConversationId>,
}

/// Reply of the non-streaming chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    /// Full assistant reply.
    pub content: String,
    /// Conversation the reply belongs to.
    pub conversation_id: ConversationId,
    /// Always `assistant` for replies from the service.
    #[serde(default = "default_response_role")]
    pub role: MessageRole,
}

const fn default_response_role() -> MessageRole {
    MessageRole::Assistant
}

impl ChatResponse {
    /// Converts the reply into a finished view message stamped now.
    #[must_use]
    pub fn into_message(self) -> ChatMessage {
        ChatMessage::new(self.role, self.content)
    }
}
