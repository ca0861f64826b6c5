//! Upstream protocol adapters
//!
//! The dialect set is closed, so adapters are a plain enum resolved once
//! into an [`AdapterTable`] indexed by dialect. Adapters pass payloads
//! through untouched apart from the model name, and never re-encode
//! streamed events.

mod anthropic;
mod gemini;
mod openai;

pub(crate) use gemini::STREAM_GENERATE;

use eventsource_stream::{Event, Eventsource};
use futures_util::{StreamExt, stream::BoxStream};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::{dialect::Dialect, error::AttemptError, groups::RoutingCandidate};

/// Upstream SSE events as they arrive
pub type ChunkStream = BoxStream<'static, Result<Event, AttemptError>>;

/// One outbound call, already bound to a candidate
#[derive(Debug, Clone)]
pub struct UpstreamCall {
    pub dialect: Dialect,
    pub candidate: RoutingCandidate,
    /// Inbound payload, cloned per attempt
    pub payload: Value,
    /// Gemini action such as `generateContent`
    pub action: Option<String>,
    /// Inbound query parameters, forwarded verbatim
    pub query: Vec<(String, String)>,
    pub stream: bool,
}

/// Upstream protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    OpenAi,
    Anthropic,
    Gemini,
}

impl Adapter {
    const fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::OpenAiChat | Dialect::OpenAiResponses => Self::OpenAi,
            Dialect::AnthropicMessages => Self::Anthropic,
            Dialect::Gemini => Self::Gemini,
        }
    }

    pub const fn supports(self, dialect: Dialect) -> bool {
        matches!(
            (self, dialect),
            (Self::OpenAi, Dialect::OpenAiChat | Dialect::OpenAiResponses)
                | (Self::Anthropic, Dialect::AnthropicMessages)
                | (Self::Gemini, Dialect::Gemini)
        )
    }

    /// Execute a buffered call and parse the JSON body
    pub async fn execute_normal(self, client: &Client, call: UpstreamCall) -> Result<Value, AttemptError> {
        let response = send(self.request(client, call)).await?;

        response
            .json::<Value>()
            .await
            .map_err(|e| AttemptError::Body(e.to_string()))
    }

    /// Execute a streaming call, returning once upstream headers arrive
    pub async fn execute_stream(self, client: &Client, call: UpstreamCall) -> Result<ChunkStream, AttemptError> {
        let response = send(self.request(client, call)).await?;

        Ok(response
            .bytes_stream()
            .eventsource()
            .map(|event| event.map_err(|e| AttemptError::Stream(e.to_string())))
            .boxed())
    }

    fn request(self, client: &Client, mut call: UpstreamCall) -> RequestBuilder {
        let builder = match self {
            Self::OpenAi => openai::request(client, &mut call),
            Self::Anthropic => anthropic::request(client, &mut call),
            Self::Gemini => gemini::request(client, &mut call),
        };

        builder
            .bearer_auth(bearer_token(call.candidate.api_key.expose_secret()))
            .query(&call.query)
            .json(&call.payload)
    }
}

/// Dialect to adapter lookup built once at startup
#[derive(Debug, Clone)]
pub struct AdapterTable {
    adapters: [Adapter; Dialect::ALL.len()],
}

impl AdapterTable {
    pub fn new() -> Self {
        let adapters = std::array::from_fn(|index| Adapter::for_dialect(Dialect::ALL[index]));
        Self { adapters }
    }

    pub const fn get(&self, dialect: Dialect) -> Adapter {
        self.adapters[dialect.index()]
    }
}

impl Default for AdapterTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the top-level `model` field with the candidate's model
pub(crate) fn substitute_model(payload: &mut Value, model: &str) {
    if let Some(object) = payload.as_object_mut() {
        object.insert("model".to_owned(), Value::String(model.to_owned()));
    }
}

fn endpoint(call: &UpstreamCall, path: &str) -> String {
    let base = call.candidate.base_url.as_str().trim_end_matches('/');
    format!("{base}{path}")
}

/// Credentials may be configured with or without the `Bearer ` prefix
fn bearer_token(api_key: &str) -> &str {
    api_key.strip_prefix("Bearer ").unwrap_or(api_key)
}

async fn send(builder: RequestBuilder) -> Result<Response, AttemptError> {
    let response = builder
        .send()
        .await
        .map_err(|e| AttemptError::Connect(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AttemptError::status(status, &body));
    }

    Ok(response)
}
