//! In-process stand-in for the chat service.

use std::{
    convert::Infallible,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use futures_util::{StreamExt, stream};
use serde_json::Value;
use shared::config::ClientConfig;
use tokio::net::TcpListener;
use url::Url;

/// What the streaming endpoint answers with.
#[derive(Clone, Debug)]
pub enum StreamScript {
    /// Send these body chunks, then close the response.
    Chunks(Vec<Vec<u8>>),
    /// Send these body chunks, then keep the response open forever.
    ChunksThenHang(Vec<Vec<u8>>),
    /// Reject the request.
    Status(StatusCode, &'static str),
    /// Reject the request, send the start of an error body, then stall.
    StatusThenHang(StatusCode, &'static str),
}

impl StreamScript {
    pub fn chunks(parts: &[&[u8]]) -> Self {
        Self::Chunks(parts.iter().map(|part| part.to_vec()).collect())
    }

    pub fn chunks_then_hang(parts: &[&[u8]]) -> Self {
        Self::ChunksThenHang(parts.iter().map(|part| part.to_vec()).collect())
    }
}

#[derive(Clone)]
struct MockState {
    script: StreamScript,
    reply: Value,
    received: Arc<Mutex<Vec<Value>>>,
}

/// A running mock service bound to an ephemeral port.
pub struct MockService {
    pub base_url: Url,
    received: Arc<Mutex<Vec<Value>>>,
}

impl MockService {
    /// Request bodies received so far, across both endpoints.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    /// Client configuration pointing at this service.
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            api_base_url: self.base_url.clone(),
            ..ClientConfig::with_defaults()
        }
    }
}

/// Starts a mock service whose non-streaming endpoint echoes `reply`.
pub async fn spawn_with_reply(script: StreamScript, reply: Value) -> MockService {
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        script,
        reply,
        received: received.clone(),
    };
    let app = Router::new()
        .route("/api/chat/stream", post(stream_handler))
        .route("/api/chat/", post(chat_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockService {
        base_url: Url::parse(&format!("http://{addr}")).unwrap(),
        received,
    }
}

/// Starts a mock service with a default non-streaming reply.
pub async fn spawn(script: StreamScript) -> MockService {
    spawn_with_reply(
        script,
        serde_json::json!({
            "content": "full reply",
            "conversation_id": "server-conv",
            "role": "assistant"
        }),
    )
    .await
}

/// Base URL on which nothing is listening.
pub async fn unused_base_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

async fn stream_handler(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.received.lock().unwrap().push(body);
    match state.script {
        StreamScript::Status(status, message) => (status, message).into_response(),
        StreamScript::StatusThenHang(status, message) => stalled_rejection(status, message),
        StreamScript::Chunks(chunks) => event_stream(Body::from_stream(chunk_stream(chunks))),
        StreamScript::ChunksThenHang(chunks) => event_stream(Body::from_stream(
            chunk_stream(chunks).chain(stream::pending()),
        )),
    }
}

async fn chat_handler(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.received.lock().unwrap().push(body);
    match state.script {
        StreamScript::Status(status, message) => (status, message).into_response(),
        StreamScript::StatusThenHang(status, message) => stalled_rejection(status, message),
        _ => Json(state.reply).into_response(),
    }
}

fn chunk_stream(
    chunks: Vec<Vec<u8>>,
) -> impl futures_util::Stream<Item = Result<Vec<u8>, Infallible>> + Send + 'static {
    stream::iter(chunks.into_iter().map(Ok))
}

fn event_stream(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

fn stalled_rejection(status: StatusCode, message: &'static str) -> Response {
    let body = chunk_stream(vec![message.as_bytes().to_vec()]).chain(stream::pending());
    (status, Body::from_stream(body)).into_response()
}
