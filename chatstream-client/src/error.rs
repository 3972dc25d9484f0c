//! # Client Error Types
//!
//! Only failures the caller has to act on cross the client boundary. A
//! malformed frame is absorbed inside the stream and cancellation is a normal
//! end of iteration, so neither has a variant here.

use reqwest::StatusCode;
use thiserror::Error;

/// Boxed error carried by [`ChatClientError::Transport`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for chat client operations.
pub type ChatResult<T> = Result<T, ChatClientError>;

/// Failures surfaced by [`crate::StreamingChatClient`] and [`crate::DeltaStream`].
#[derive(Error, Debug)]
pub enum ChatClientError {
    /// The message was empty after trimming; no request was sent.
    #[error("message must not be empty")]
    EmptyMessage,

    /// The request could not be made or the service answered with a
    /// non-success status. Nothing was yielded.
    #[error("chat request failed: {message}")]
    Request {
        /// Response status, absent when no response arrived at all.
        status: Option<StatusCode>,
        /// Human-readable cause.
        message: String,
    },

    /// The response body failed after the stream started. Fragments already
    /// yielded remain valid.
    #[error("chat stream interrupted: {source}")]
    Transport {
        /// Underlying read error.
        #[source]
        source: BoxError,
    },

    /// A non-streaming reply was not the expected JSON document.
    #[error("invalid chat response: {source}")]
    Decode {
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// The endpoint URL could not be derived from the configured base URL.
    #[error("invalid chat endpoint: {source}")]
    Endpoint {
        /// URL join error.
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// Builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl ChatClientError {
    /// Wraps a send failure (connection refused, DNS, TLS, ...).
    #[must_use]
    pub fn request_failed(err: &reqwest::Error) -> Self {
        Self::Request {
            status: err.status(),
            message: err.to_string(),
        }
    }

    /// Builds the error for a non-success response status.
    #[must_use]
    pub fn rejected(status: StatusCode, body: impl AsRef<str>) -> Self {
        const MAX_BODY_CHARS: usize = 200;

        let body = body.as_ref().trim();
        let message = if body.is_empty() {
            format!("service responded with {status}")
        } else {
            let snippet: String = body.chars().take(MAX_BODY_CHARS).collect();
            format!("service responded with {status}: {snippet}")
        };
        Self::Request {
            status: Some(status),
            message,
        }
    }

    /// Wraps a mid-stream read failure.
    #[must_use]
    pub fn transport(source: impl Into<BoxError>) -> Self {
        Self::Transport {
            source: source.into(),
        }
    }

    /// `true` when the failure happened before anything was yielded.
    #[must_use]
    pub const fn is_request(&self) -> bool {
        matches!(self, Self::EmptyMessage | Self::Request { .. } | Self::Endpoint { .. })
    }

    /// `true` when the stream broke after it had started.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Response status attached to the failure, if any.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Request { status, .. } => *status,
            _ => None,
        }
    }
}
