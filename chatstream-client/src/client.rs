use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, Response};
use shared::{
    config::ClientConfig,
    models::{ChatMessage, ChatRequest, ChatResponse, ConversationId},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{ChatClientError, ChatResult},
    stream::{DeltaStream, decode_deltas},
};

const STREAM_PATH: &str = "api/chat/stream";
const CHAT_PATH: &str = "api/chat/";

/// How long a rejected response may take to deliver its error body.
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(2);
/// Bytes of a rejected response's body kept for the error message.
const ERROR_BODY_LIMIT: usize = 1024;

/// Reads the start of a rejected response's body.
///
/// Stops at [`ERROR_BODY_LIMIT`] bytes, at the end of the body, or after
/// [`ERROR_BODY_TIMEOUT`], whichever comes first, so a body that never ends
/// cannot hold back the error.
async fn read_error_body(response: Response) -> String {
    let mut body = response.bytes_stream();
    let mut collected = Vec::new();
    let read = async {
        while collected.len() < ERROR_BODY_LIMIT {
            match body.next().await {
                Some(Ok(chunk)) => collected.extend_from_slice(&chunk),
                Some(Err(_)) | None => break,
            }
        }
    };
    if tokio::time::timeout(ERROR_BODY_TIMEOUT, read).await.is_err() {
        debug!("error body still streaming; using what arrived");
    }
    collected.truncate(ERROR_BODY_LIMIT);
    String::from_utf8_lossy(&collected).into_owned()
}

/// HTTP client for the chat service.
///
/// Cloning is cheap; clones share the connection pool but every
/// [`open`](Self::open) call owns its own response body and decoder.
#[derive(Clone, Debug)]
pub struct StreamingChatClient {
    http: Client,
    stream_endpoint: Url,
    chat_endpoint: Url,
}

impl StreamingChatClient {
    /// Builds a client from the resolved configuration.
    ///
    /// # Errors
    /// Returns [`ChatClientError::Endpoint`] if the endpoints cannot be derived
    /// from the base URL, or [`ChatClientError::Client`] if the HTTP client
    /// cannot be built.
    pub fn new(config: &ClientConfig) -> ChatResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| ChatClientError::Client { source })?;
        Self::with_http_client(http, config)
    }

    /// Builds a client around an existing [`reqwest::Client`].
    ///
    /// # Errors
    /// Returns [`ChatClientError::Endpoint`] if the endpoints cannot be derived
    /// from the base URL.
    pub fn with_http_client(http: Client, config: &ClientConfig) -> ChatResult<Self> {
        let endpoint = |path| {
            config
                .endpoint(path)
                .map_err(|source| ChatClientError::Endpoint { source })
        };
        Ok(Self {
            stream_endpoint: endpoint(STREAM_PATH)?,
            chat_endpoint: endpoint(CHAT_PATH)?,
            http,
        })
    }

    /// Streaming endpoint this client posts to.
    #[must_use]
    pub fn stream_endpoint(&self) -> &Url {
        &self.stream_endpoint
    }

    /// Posts `message` and returns the reply as a lazy sequence of deltas.
    ///
    /// Nothing is sent until the returned stream is first polled. An empty
    /// message or a failed request is reported as the first and only item.
    pub fn open(&self, message: &str, conversation_id: &ConversationId) -> DeltaStream {
        self.open_with_cancel(message, conversation_id, CancellationToken::new())
    }

    /// Like [`open`](Self::open), but stops when `cancel` fires.
    pub fn open_with_cancel(
        &self,
        message: &str,
        conversation_id: &ConversationId,
        cancel: CancellationToken,
    ) -> DeltaStream {
        let http = self.http.clone();
        let endpoint = self.stream_endpoint.clone();
        let conversation_id = conversation_id.clone();
        let request = ChatRequest {
            message: message.to_string(),
            conversation_id: Some(conversation_id.clone()),
        };
        let token = cancel.clone();

        let deltas = async_stream::stream! {
            if request.message.trim().is_empty() {
                yield Err(ChatClientError::EmptyMessage);
                return;
            }
            debug!(%conversation_id, %endpoint, "opening chat stream");

            let sent = tokio::select! {
                biased;
                () = token.cancelled() => None,
                result = http.post(endpoint).json(&request).send() => Some(result),
            };
            let response = match sent {
                None => {
                    debug!(%conversation_id, "chat stream cancelled before response");
                    return;
                }
                Some(Err(err)) => {
                    warn!(%conversation_id, error = %err, "chat request failed");
                    yield Err(ChatClientError::request_failed(&err));
                    return;
                }
                Some(Ok(response)) => response,
            };

            let status = response.status();
            if !status.is_success() {
                let body = tokio::select! {
                    biased;
                    () = token.cancelled() => None,
                    body = read_error_body(response) => Some(body),
                };
                let Some(body) = body else {
                    debug!(%conversation_id, "chat stream cancelled while reading rejection");
                    return;
                };
                warn!(%conversation_id, %status, "chat request rejected");
                yield Err(ChatClientError::rejected(status, body));
                return;
            }

            let mut deltas = decode_deltas(response.bytes_stream(), token.clone());
            while let Some(delta) = deltas.next().await {
                yield delta;
            }
            debug!(%conversation_id, "chat stream closed");
        };

        DeltaStream::new(deltas, cancel)
    }

    /// Posts `message` to the non-streaming endpoint and waits for the full
    /// reply.
    ///
    /// # Errors
    /// Returns [`ChatClientError::EmptyMessage`] for blank input,
    /// [`ChatClientError::Request`] for connection failures or non-success
    /// statuses, [`ChatClientError::Transport`] if the body cannot be read and
    /// [`ChatClientError::Decode`] if it is not a chat response.
    pub async fn send_message(
        &self,
        message: &str,
        conversation_id: Option<&ConversationId>,
    ) -> ChatResult<ChatMessage> {
        if message.trim().is_empty() {
            return Err(ChatClientError::EmptyMessage);
        }
        let request = ChatRequest {
            message: message.to_string(),
            conversation_id: conversation_id.cloned(),
        };

        let response = self
            .http
            .post(self.chat_endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|err| ChatClientError::request_failed(&err))?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            warn!(%status, "chat request rejected");
            return Err(ChatClientError::rejected(status, body));
        }

        let body = response.bytes().await.map_err(ChatClientError::transport)?;
        let reply: ChatResponse =
            serde_json::from_slice(&body).map_err(|source| ChatClientError::Decode { source })?;
        debug!(conversation_id = %reply.conversation_id, "received chat reply");
        Ok(reply.into_message())
    }
}
