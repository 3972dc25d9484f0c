//! Caller-side conversation state: the message list a view renders and the
//! single assistant message being streamed into it.

use shared::models::{ChatMessage, ConversationId, MessageRole};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Longest message the composer accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Assistant text shown in place of a reply that could not be obtained.
pub const APOLOGY_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// Rejected composer input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    /// Nothing but whitespace was entered.
    #[error("message must not be empty")]
    Empty,
    /// The input exceeds [`MAX_MESSAGE_CHARS`].
    #[error("message is {len} characters long; the limit is {max}")]
    TooLong {
        /// Length of the rejected input.
        len: usize,
        /// The enforced limit.
        max: usize,
    },
}

/// Reasons an exchange cannot start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    /// A reply is still streaming; input stays disabled until it ends.
    #[error("a reply is still streaming")]
    Busy,
    /// The composer input was rejected.
    #[error(transparent)]
    Input(#[from] InputError),
}

/// Validates composer input and returns the trimmed text to send.
///
/// The length limit applies to the input as typed, before trimming.
///
/// # Errors
/// Returns [`InputError::TooLong`] past [`MAX_MESSAGE_CHARS`] and
/// [`InputError::Empty`] for blank input.
pub fn validate_input(input: &str) -> Result<&str, InputError> {
    let len = input.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(InputError::TooLong {
            len,
            max: MAX_MESSAGE_CHARS,
        });
    }
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InputError::Empty);
    }
    Ok(trimmed)
}

/// Assistant reply under construction.
///
/// Content only grows. [`finish`](Self::finish) consumes the value, so a
/// finalized message can no longer be extended.
#[derive(Debug)]
pub struct PendingAssistantMessage {
    message: ChatMessage,
}

impl PendingAssistantMessage {
    fn new() -> Self {
        Self {
            message: ChatMessage::new(MessageRole::Assistant, String::new()),
        }
    }

    /// Identifier the finished message will keep.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.message.id
    }

    /// Text received so far.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.message.content
    }

    /// `true` until the first non-empty delta arrives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.content.is_empty()
    }

    /// Borrows the in-progress message for rendering.
    #[must_use]
    pub fn as_message(&self) -> &ChatMessage {
        &self.message
    }

    fn append(&mut self, delta: &str) {
        self.message.content.push_str(delta);
    }

    fn finish(self) -> ChatMessage {
        self.message
    }
}

/// One conversation session.
#[derive(Debug)]
pub struct Conversation {
    id: ConversationId,
    messages: Vec<ChatMessage>,
    pending: Option<PendingAssistantMessage>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Starts a session with a freshly generated conversation id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(ConversationId::generate())
    }

    /// Starts a session that reuses an existing conversation id.
    #[must_use]
    pub fn with_id(id: ConversationId) -> Self {
        Self {
            id,
            messages: Vec::new(),
            pending: None,
        }
    }

    /// The session's correlation token.
    #[must_use]
    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Finalized messages in display order.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The reply currently streaming, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingAssistantMessage> {
        self.pending.as_ref()
    }

    /// `true` while a reply is streaming.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.pending.is_some()
    }

    /// Every message to render, with the in-progress reply last.
    pub fn transcript(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages
            .iter()
            .chain(self.pending.iter().map(PendingAssistantMessage::as_message))
    }

    /// Records the user's message and opens an empty assistant reply.
    ///
    /// Returns the trimmed text to send.
    ///
    /// # Errors
    /// [`ConversationError::Busy`] while another reply is streaming, or
    /// [`ConversationError::Input`] if the input is rejected. The conversation
    /// is unchanged on error.
    pub fn begin_exchange(&mut self, input: &str) -> Result<String, ConversationError> {
        if self.is_streaming() {
            return Err(ConversationError::Busy);
        }
        let text = validate_input(input)?.to_string();
        self.messages.push(ChatMessage::user(text.clone()));
        self.pending = Some(PendingAssistantMessage::new());
        debug!(conversation_id = %self.id, "exchange started");
        Ok(text)
    }

    /// Appends a delta to the streaming reply. Returns `false` when no reply
    /// is streaming.
    pub fn append_delta(&mut self, delta: &str) -> bool {
        match self.pending.as_mut() {
            Some(pending) => {
                pending.append(delta);
                true
            }
            None => false,
        }
    }

    /// Finalizes the streaming reply as received so far.
    ///
    /// Used for every non-failing end: sentinel, end of body, cancellation.
    pub fn complete(&mut self) -> Option<&ChatMessage> {
        let message = self.pending.take()?.finish();
        debug!(conversation_id = %self.id, chars = message.content.len(), "exchange completed");
        self.messages.push(message);
        self.messages.last()
    }

    /// Ends the streaming reply after a failure.
    ///
    /// Partial content is kept as its own message; an empty reply is
    /// dropped. Either way an apology message follows.
    pub fn fail(&mut self) {
        if let Some(pending) = self.pending.take()
            && !pending.is_empty()
        {
            self.messages.push(pending.finish());
        }
        self.messages.push(ChatMessage::assistant(APOLOGY_MESSAGE));
        debug!(conversation_id = %self.id, "exchange failed");
    }
}
