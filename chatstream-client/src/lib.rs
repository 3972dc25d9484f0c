#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::multiple_crate_versions)]

//! Streaming chat client.
//!
//! [`StreamingChatClient::open`] posts one user message and returns a
//! [`DeltaStream`]: a lazy, pull-based sequence of reply fragments decoded
//! from the service's line-oriented `data: ` event stream. [`Conversation`]
//! and [`run_exchange`] fold those fragments into the message list a view
//! renders.

pub mod client;
pub mod conversation;
pub mod decoder;
pub mod error;
pub mod exchange;
pub(crate) mod frame;
pub mod stream;

pub use client::StreamingChatClient;
pub use conversation::{
    APOLOGY_MESSAGE, Conversation, ConversationError, InputError, MAX_MESSAGE_CHARS,
    PendingAssistantMessage, validate_input,
};
pub use error::{ChatClientError, ChatResult};
pub use exchange::{ExchangeOutcome, run_exchange};
pub use stream::{DeltaStream, decode_deltas};
