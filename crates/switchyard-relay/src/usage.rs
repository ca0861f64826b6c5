//! Token usage extraction from upstream responses
//!
//! Usage sits at different depths depending on provider and API version:
//! top-level `usage` (chat completions, Anthropic responses and
//! `message_delta` events), `message.usage` (Anthropic `message_start`),
//! `response.usage` (responses API events), and `usageMetadata` (Gemini).
//! Every shape is checked on every body or chunk.

use serde::Serialize;
use serde_json::Value;

/// Model and token counts observed so far for one request
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub actual_model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl Usage {
    /// Fold one response body or stream chunk into the running totals
    ///
    /// Streaming usage is cumulative, so the largest count seen wins.
    pub fn observe(&mut self, node: &Value) {
        if !node.is_object() {
            return;
        }

        if let Some(model) = find_string(node, "model").or_else(|| find_string(node, "modelVersion")) {
            self.actual_model = Some(model.to_owned());
        }

        for usage in [
            node.get("usage"),
            node.pointer("/message/usage"),
            node.pointer("/response/usage"),
        ]
        .into_iter()
        .flatten()
        {
            self.record(usage, &["prompt_tokens", "input_tokens"], &["completion_tokens", "output_tokens"]);
        }

        if let Some(metadata) = node.get("usageMetadata") {
            self.record(metadata, &["promptTokenCount"], &["candidatesTokenCount"]);
        }
    }

    /// Parse and observe one SSE `data` payload, ignoring non-JSON frames
    pub fn observe_chunk(&mut self, data: &str) {
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return;
        }

        if let Ok(node) = serde_json::from_str::<Value>(data) {
            self.observe(&node);
        }
    }

    fn record(&mut self, usage: &Value, input_keys: &[&str], output_keys: &[&str]) {
        for key in input_keys {
            raise(&mut self.input_tokens, usage.get(key));
        }
        for key in output_keys {
            raise(&mut self.output_tokens, usage.get(key));
        }
    }
}

fn raise(slot: &mut Option<u64>, value: Option<&Value>) {
    if let Some(count) = value.and_then(Value::as_u64) {
        *slot = Some(slot.map_or(count, |current| current.max(count)));
    }
}

/// Depth-first search for the first string field named `key`
fn find_string<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    match node {
        Value::Object(map) => {
            if let Some(found) = map.get(key).and_then(Value::as_str) {
                return Some(found);
            }
            map.values().find_map(|child| find_string(child, key))
        }
        Value::Array(items) => items.iter().find_map(|child| find_string(child, key)),
        _ => None,
    }
}
