use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;

use super::{UpstreamCall, bearer_token, endpoint};

pub(crate) const GENERATE: &str = "generateContent";
pub(crate) const STREAM_GENERATE: &str = "streamGenerateContent";

/// The model travels in the path, so the payload is left untouched
pub(super) fn request(client: &Client, call: &mut UpstreamCall) -> RequestBuilder {
    let action = call
        .action
        .as_deref()
        .unwrap_or(if call.stream { STREAM_GENERATE } else { GENERATE });
    let path = format!("/v1beta/models/{}:{action}", call.candidate.model);

    // Streaming responses are only SSE-framed when asked for
    if call.stream && !call.query.iter().any(|(key, _)| key == "alt") {
        call.query.push(("alt".to_owned(), "sse".to_owned()));
    }

    client
        .post(endpoint(call, &path))
        .header("x-goog-api-key", bearer_token(call.candidate.api_key.expose_secret()))
}
