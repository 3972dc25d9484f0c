use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    client::StreamingChatClient,
    conversation::{Conversation, ConversationError},
    error::ChatClientError,
};

/// How an exchange ended. The reply is finalized in every case.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// The service finished the reply (sentinel or end of body).
    Completed,
    /// The caller stopped the reply; the text received so far is kept.
    Cancelled,
    /// The request or the stream failed; an apology message was added.
    Failed(ChatClientError),
}

/// Sends `input` and streams the reply into `conversation`.
///
/// `on_delta` runs after each fragment is appended, so a view can re-render
/// or print incrementally. Firing `cancel` stops the reply early; what
/// arrived before stays in the conversation as the final content.
///
/// # Errors
/// Returns [`ConversationError`] without sending anything when the
/// conversation is busy or the input is rejected. Network failures are not
/// errors here: they are reported as [`ExchangeOutcome::Failed`] after the
/// conversation has been updated.
pub async fn run_exchange<F>(
    client: &StreamingChatClient,
    conversation: &mut Conversation,
    input: &str,
    cancel: CancellationToken,
    mut on_delta: F,
) -> Result<ExchangeOutcome, ConversationError>
where
    F: FnMut(&str),
{
    let text = conversation.begin_exchange(input)?;
    let mut deltas = client.open_with_cancel(&text, conversation.id(), cancel);

    while let Some(item) = deltas.next().await {
        match item {
            Ok(delta) => {
                conversation.append_delta(&delta);
                on_delta(&delta);
            }
            Err(err) => {
                warn!(conversation_id = %conversation.id(), error = %err, "chat exchange failed");
                conversation.fail();
                return Ok(ExchangeOutcome::Failed(err));
            }
        }
    }

    conversation.complete();
    if deltas.is_cancelled() {
        Ok(ExchangeOutcome::Cancelled)
    } else {
        Ok(ExchangeOutcome::Completed)
    }
}
