use reqwest::{Client, RequestBuilder};

use super::{UpstreamCall, endpoint, substitute_model};
use crate::dialect::Dialect;

pub(super) fn request(client: &Client, call: &mut UpstreamCall) -> RequestBuilder {
    substitute_model(&mut call.payload, &call.candidate.model);

    let path = match call.dialect {
        Dialect::OpenAiResponses => "/responses",
        _ => "/chat/completions",
    };

    client.post(endpoint(call, path))
}
