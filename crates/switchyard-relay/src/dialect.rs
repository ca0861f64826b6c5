use serde::Serialize;

/// Inbound wire format of a request
///
/// The set is closed: every route maps to exactly one dialect and every
/// dialect to exactly one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
pub enum Dialect {
    #[serde(rename = "openai_chat_completions")]
    #[strum(serialize = "openai_chat_completions")]
    OpenAiChat,
    #[serde(rename = "openai_responses")]
    #[strum(serialize = "openai_responses")]
    OpenAiResponses,
    #[serde(rename = "anthropic_messages")]
    #[strum(serialize = "anthropic_messages")]
    AnthropicMessages,
    #[serde(rename = "gemini_models")]
    #[strum(serialize = "gemini_models")]
    Gemini,
}

impl Dialect {
    pub const ALL: [Self; 4] = [
        Self::OpenAiChat,
        Self::OpenAiResponses,
        Self::AnthropicMessages,
        Self::Gemini,
    ];

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}
