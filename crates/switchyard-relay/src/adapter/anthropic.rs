use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;

use super::{UpstreamCall, bearer_token, endpoint, substitute_model};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(super) fn request(client: &Client, call: &mut UpstreamCall) -> RequestBuilder {
    substitute_model(&mut call.payload, &call.candidate.model);

    client
        .post(endpoint(call, "/messages"))
        .header("x-api-key", bearer_token(call.candidate.api_key.expose_secret()))
        .header("anthropic-version", ANTHROPIC_VERSION)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{adapter::tests::call, dialect::Dialect};

    #[test]
    fn messages_endpoint_with_version_header() {
        let mut call = call(
            Dialect::AnthropicMessages,
            "https://api.anthropic.com/v1",
            json!({ "model": "claude", "max_tokens": 16 }),
        );
        let request = request(&Client::new(), &mut call).build().unwrap();

        assert_eq!(request.url().as_str(), "https://api.anthropic.com/v1/messages");
        assert_eq!(request.headers()["x-api-key"], "sk-test");
        assert_eq!(request.headers()["anthropic-version"], ANTHROPIC_VERSION);
        assert_eq!(call.payload["max_tokens"], 16);
    }
}
