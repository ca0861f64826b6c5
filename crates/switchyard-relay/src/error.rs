use http::StatusCode;
use serde::Serialize;
use switchyard_core::HttpError;
use thiserror::Error;

/// Upstream bodies are truncated to this many characters in error messages
const MAX_ERROR_BODY: usize = 512;

/// Where in the request lifecycle a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorStage {
    /// No provider could be selected
    Selection,
    Connect,
    Status,
    Body,
    FirstChunk,
    Stream,
    Timeout,
}

/// Why a single upstream attempt failed
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid upstream response: {0}")]
    Body(String),

    /// Stream broke before any chunk reached the caller
    #[error("stream failed before first chunk: {0}")]
    Stream(String),

    /// Stream broke after output was forwarded, never retried
    #[error("stream interrupted: {0}")]
    MidStream(String),

    #[error("no upstream response within {after_ms}ms")]
    Timeout { after_ms: u64, mid_stream: bool },
}

impl AttemptError {
    pub(crate) fn status(status: StatusCode, body: &str) -> Self {
        Self::Status {
            status,
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        }
    }

    pub const fn stage(&self) -> ErrorStage {
        match self {
            Self::Connect(_) => ErrorStage::Connect,
            Self::Status { .. } => ErrorStage::Status,
            Self::Body(_) => ErrorStage::Body,
            Self::Stream(_) => ErrorStage::FirstChunk,
            Self::MidStream(_) => ErrorStage::Stream,
            Self::Timeout { .. } => ErrorStage::Timeout,
        }
    }

    /// Whether output already reached the caller when this happened
    pub const fn is_mid_stream(&self) -> bool {
        matches!(self, Self::MidStream(_) | Self::Timeout { mid_stream: true, .. })
    }

    /// Reclassify a failure observed after the first forwarded chunk
    pub(crate) fn into_mid_stream(self) -> Self {
        match self {
            Self::Timeout { after_ms, .. } => Self::Timeout {
                after_ms,
                mid_stream: true,
            },
            Self::MidStream(message) => Self::MidStream(message),
            other => Self::MidStream(other.to_string()),
        }
    }
}

/// Errors surfaced to the caller of the relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// Logical model name matches no configured group
    #[error("model not found: {model}")]
    RoutingNotFound { model: String },

    /// Every candidate failed or was refused admission
    #[error("{}", exhausted_message(group, *attempts, last_error.as_ref()))]
    ProvidersExhausted {
        group: String,
        attempts: u32,
        last_error: Option<AttemptError>,
    },

    /// Stream failed after output was forwarded
    #[error("stream interrupted: {0}")]
    MidStream(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    /// Stage recorded in the request log for this error
    pub fn stage(&self) -> ErrorStage {
        match self {
            Self::ProvidersExhausted {
                last_error: Some(last), ..
            } => last.stage(),
            Self::MidStream(_) => ErrorStage::Stream,
            _ => ErrorStage::Selection,
        }
    }

    fn timed_out(&self) -> bool {
        matches!(
            self,
            Self::ProvidersExhausted {
                last_error: Some(AttemptError::Timeout { .. }),
                ..
            }
        )
    }
}

fn exhausted_message(group: &str, attempts: u32, last_error: Option<&AttemptError>) -> String {
    match last_error {
        Some(last) => format!("all providers for '{group}' failed after {attempts} attempt(s), last error: {last}"),
        None => format!("no available provider for '{group}'"),
    }
}

impl HttpError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::RoutingNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ProvidersExhausted { .. } if self.timed_out() => StatusCode::GATEWAY_TIMEOUT,
            Self::ProvidersExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::MidStream(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::RoutingNotFound { .. } => "model_not_found",
            Self::ProvidersExhausted { .. } if self.timed_out() => "upstream_timeout",
            Self::ProvidersExhausted { .. } => "providers_exhausted",
            Self::MidStream(_) => "stream_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}
