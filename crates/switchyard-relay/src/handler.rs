//! Axum routes for the inbound dialects
//!
//! Bodies are parsed here rather than with the `Json` extractor so malformed
//! input is answered in the caller's own error shape.

use std::convert::Infallible;

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, State},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing,
};
use futures_util::{Stream, StreamExt};
use http::StatusCode;
use serde_json::{Value, json};
use switchyard_core::{HttpError, RequestContext};

use crate::{
    dialect::Dialect,
    dispatcher::{InboundRequest, RelayResponse, RelayState},
    error::RelayError,
    stream::RelayStream,
};

/// Build the relay router with one route per dialect
pub fn relay_router(state: RelayState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(openai_chat_completions))
        .route("/v1/responses", routing::post(openai_responses))
        .route("/v1/messages", routing::post(anthropic_messages))
        .route("/v1beta/models/{model_action}", routing::post(gemini_models))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn openai_chat_completions(
    State(state): State<RelayState>,
    Extension(context): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    relay(&state, context, Dialect::OpenAiChat, None, &body).await
}

/// Handle `POST /v1/responses`
async fn openai_responses(
    State(state): State<RelayState>,
    Extension(context): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    relay(&state, context, Dialect::OpenAiResponses, None, &body).await
}

/// Handle `POST /v1/messages`
async fn anthropic_messages(
    State(state): State<RelayState>,
    Extension(context): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    relay(&state, context, Dialect::AnthropicMessages, None, &body).await
}

/// Handle `POST /v1beta/models/{model}:{action}`
async fn gemini_models(
    State(state): State<RelayState>,
    Extension(context): Extension<RequestContext>,
    Path(model_action): Path<String>,
    body: Bytes,
) -> Response {
    relay(&state, context, Dialect::Gemini, Some(model_action), &body).await
}

async fn relay(
    state: &RelayState,
    context: RequestContext,
    dialect: Dialect,
    model_action: Option<String>,
    body: &[u8],
) -> Response {
    let payload = match serde_json::from_slice::<Value>(body) {
        Ok(payload) => payload,
        Err(e) => return error_response(dialect, &RelayError::InvalidRequest(format!("malformed JSON body: {e}"))),
    };

    let request = InboundRequest {
        dialect,
        payload,
        model_action,
    };

    match state.relay(request, context).await {
        Ok(RelayResponse::Json(body)) => Json(body).into_response(),
        Ok(RelayResponse::Stream(stream)) => Sse::new(sse_events(dialect, stream))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(e) => error_response(dialect, &e),
    }
}

/// Re-frame upstream events as-is, ending with an error event on failure
fn sse_events(dialect: Dialect, stream: RelayStream) -> impl Stream<Item = Result<Event, Infallible>> {
    stream.map(move |item| {
        Ok(match item {
            Ok(upstream) => {
                let mut event = Event::default().data(upstream.data);
                if !upstream.event.is_empty() && upstream.event != "message" {
                    event = event.event(upstream.event);
                }
                if !upstream.id.is_empty() {
                    event = event.id(upstream.id);
                }
                event
            }
            Err(e) => {
                let event = Event::default().data(error_body(dialect, &e).to_string());
                if dialect == Dialect::AnthropicMessages {
                    event.event("error")
                } else {
                    event
                }
            }
        })
    })
}

/// Gateway error in the caller's dialect
fn error_response(dialect: Dialect, error: &RelayError) -> Response {
    if error.status_code().is_server_error() {
        tracing::warn!(dialect = %dialect, stage = %error.stage(), error = %error, "relay failed");
    } else {
        tracing::debug!(dialect = %dialect, error = %error, "request rejected");
    }

    (error.status_code(), Json(error_body(dialect, error))).into_response()
}

fn error_body(dialect: Dialect, error: &RelayError) -> Value {
    match dialect {
        Dialect::OpenAiChat | Dialect::OpenAiResponses => json!({
            "error": {
                "message": error.client_message(),
                "type": error.error_type(),
                "code": Value::Null,
            }
        }),
        Dialect::AnthropicMessages => json!({
            "type": "error",
            "error": {
                "type": error.error_type(),
                "message": error.client_message(),
            }
        }),
        Dialect::Gemini => json!({
            "error": {
                "code": error.status_code().as_u16(),
                "message": error.client_message(),
                "status": google_status(error.status_code()),
            }
        }),
    }
}

/// Google RPC status name for an HTTP status
fn google_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "INVALID_ARGUMENT",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::GATEWAY_TIMEOUT => "DEADLINE_EXCEEDED",
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => "UNAVAILABLE",
        _ => "INTERNAL",
    }
}
