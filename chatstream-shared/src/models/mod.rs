//! Wire and view models for the chat client.

pub mod chat;
pub mod conversation;
pub mod streaming;
pub mod timestamp;

pub use chat::{ChatMessage, ChatRequest, ChatResponse, MessageRole};
pub use conversation::ConversationId;
pub use streaming::{DONE_SENTINEL, FRAME_PREFIX, StreamDelta};
pub use timestamp::Timestamp;
