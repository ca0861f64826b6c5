use uuid::Uuid;

/// Per-request data carried from the HTTP layer into the relay
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlates log lines and the usage record of one inbound request
    pub request_id: String,
    /// Inbound query parameters, forwarded verbatim to the upstream URL
    pub query: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new(query: Vec<(String, String)>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            query,
        }
    }

    /// Context for calls that did not come through HTTP
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::empty()
    }
}
