use serde::{Deserialize, Serialize};

use super::conversation::ConversationId;

/// Literal prefix of every event line in the response stream.
pub const FRAME_PREFIX: &str = "data: ";

/// Payload marking intentional end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One content delta carried by a `data: ` frame.
///
/// Only `content` is required. The remaining fields are sent by the service
/// for correlation and are passed through untouched; unknown fields are
/// ignored so that newer servers do not break older clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamDelta {
    /// Fragment of assistant text. May be empty.
    pub content: String,
    /// Server-side response identifier shared by every delta of one reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Conversation the delta belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    /// Role as reported by the server, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}
