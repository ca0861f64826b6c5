//! Mock upstream provider for integration tests
//!
//! Serves the OpenAI, Anthropic, and Gemini endpoints the relay calls, with
//! a configurable failure behavior and a record of what it received.

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing,
};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// How the mock answers
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Canned success in the requested dialect, streamed when asked
    Healthy,
    /// Always answer with this status
    Fail(StatusCode),
    /// Stall this long before answering
    Slow(Duration),
    /// Stream one event, then drop the connection
    BreakMidStream,
}

/// What the mock saw on its last request
#[derive(Debug, Clone)]
pub struct Received {
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Value,
}

struct MockState {
    behavior: Behavior,
    hits: AtomicU32,
    last: Mutex<Option<Received>>,
}

/// A mock upstream provider bound to an ephemeral port
pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockUpstream {
    pub async fn healthy() -> Self {
        Self::start(Behavior::Healthy).await
    }

    pub async fn failing(status: StatusCode) -> Self {
        Self::start(Behavior::Fail(status)).await
    }

    pub async fn start(behavior: Behavior) -> Self {
        let state = Arc::new(MockState {
            behavior,
            hits: AtomicU32::new(0),
            last: Mutex::new(None),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(openai_chat))
            .route("/v1/responses", routing::post(openai_chat))
            .route("/v1/messages", routing::post(anthropic_messages))
            .route("/v1beta/models/{model_action}", routing::post(gemini_models))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream address");
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Self { addr, shutdown, state }
    }

    /// API root for OpenAI and Anthropic candidates
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// API root for Gemini candidates, which append `/v1beta/...`
    pub fn root_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far
    pub fn hits(&self) -> u32 {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Received {
        self.state
            .last
            .lock()
            .unwrap()
            .clone()
            .expect("mock upstream received a request")
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

enum Reply {
    Respond,
    Error(Response),
}

/// Record the request and apply the failure behavior
async fn receive(state: &MockState, path: String, query: Option<String>, headers: HeaderMap, body: Value) -> Reply {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last.lock().unwrap() = Some(Received {
        path,
        query,
        headers,
        body,
    });

    match &state.behavior {
        Behavior::Fail(status) => Reply::Error((*status, Json(json!({ "error": { "message": "mock failure" } }))).into_response()),
        Behavior::Slow(delay) => {
            tokio::time::sleep(*delay).await;
            Reply::Respond
        }
        Behavior::Healthy | Behavior::BreakMidStream => Reply::Respond,
    }
}

fn sse(state: &MockState, frames: Vec<String>) -> Response {
    let mut chunks: Vec<Result<Bytes, std::io::Error>> = Vec::new();

    if matches!(state.behavior, Behavior::BreakMidStream) {
        chunks.push(Ok(Bytes::from(frames[0].clone())));
        chunks.push(Err(std::io::Error::other("mock connection reset")));
    } else {
        chunks.extend(frames.into_iter().map(|frame| Ok(Bytes::from(frame))));
    }

    // Pace the frames so each is flushed before the next, or before the reset
    let paced = stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        chunk
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(paced))
        .expect("valid SSE response")
}

async fn openai_chat(
    State(state): State<Arc<MockState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let model = body["model"].as_str().unwrap_or_default().to_owned();
    let streaming = body["stream"].as_bool().unwrap_or(false);

    if let Reply::Error(response) = receive(&state, "/v1/chat/completions".to_owned(), query, headers, body).await {
        return response;
    }

    if streaming {
        return sse(
            &state,
            vec![
                format!("data: {}\n\n", json!({ "model": model, "choices": [{ "delta": { "content": "Hel" } }] })),
                format!("data: {}\n\n", json!({ "model": model, "choices": [{ "delta": { "content": "lo" } }] })),
                format!(
                    "data: {}\n\n",
                    json!({ "model": model, "choices": [], "usage": { "prompt_tokens": 9, "completion_tokens": 2 } })
                ),
                "data: [DONE]\n\n".to_owned(),
            ],
        );
    }

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "Hello from mock upstream" },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 1000, "completion_tokens": 500, "total_tokens": 1500 }
    }))
    .into_response()
}

async fn anthropic_messages(
    State(state): State<Arc<MockState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let model = body["model"].as_str().unwrap_or_default().to_owned();
    let streaming = body["stream"].as_bool().unwrap_or(false);

    if let Reply::Error(response) = receive(&state, "/v1/messages".to_owned(), query, headers, body).await {
        return response;
    }

    if streaming {
        return sse(
            &state,
            vec![
                format!(
                    "event: message_start\ndata: {}\n\n",
                    json!({ "type": "message_start", "message": { "model": model, "usage": { "input_tokens": 12, "output_tokens": 1 } } })
                ),
                format!(
                    "event: content_block_delta\ndata: {}\n\n",
                    json!({ "type": "content_block_delta", "delta": { "type": "text_delta", "text": "Hi" } })
                ),
                format!(
                    "event: message_delta\ndata: {}\n\n",
                    json!({ "type": "message_delta", "usage": { "output_tokens": 7 } })
                ),
                format!("event: message_stop\ndata: {}\n\n", json!({ "type": "message_stop" })),
            ],
        );
    }

    Json(json!({
        "id": "msg_mock",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": [{ "type": "text", "text": "Hello from mock upstream" }],
        "usage": { "input_tokens": 12, "output_tokens": 7 }
    }))
    .into_response()
}

async fn gemini_models(
    State(state): State<Arc<MockState>>,
    Path(model_action): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let (model, action) = model_action.split_once(':').unwrap_or((model_action.as_str(), ""));
    let model = model.to_owned();
    let streaming = action == "streamGenerateContent";

    if let Reply::Error(response) =
        receive(&state, format!("/v1beta/models/{model_action}"), query, headers, body).await
    {
        return response;
    }

    let chunk = |text: &str, output: u32| {
        json!({
            "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }],
            "usageMetadata": { "promptTokenCount": 5, "candidatesTokenCount": output },
            "modelVersion": model
        })
    };

    if streaming {
        return sse(
            &state,
            vec![
                format!("data: {}\n\n", chunk("Hel", 1)),
                format!("data: {}\n\n", chunk("lo", 3)),
            ],
        );
    }

    Json(chunk("Hello", 3)).into_response()
}
