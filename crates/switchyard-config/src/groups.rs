use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// A logical model name and the upstream providers able to serve it
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    #[serde(default)]
    pub mode: BalanceMode,
    /// Fallback matcher for model names that are not an exact group name
    pub match_regex: Option<String>,
    /// Per-attempt deadline until the first response byte or chunk
    #[serde(default, deserialize_with = "crate::duration::deserialize_opt")]
    pub first_token_timeout: Option<Duration>,
    /// Ordered candidate list, order matters for `priority` mode
    #[serde(default)]
    pub candidates: Vec<CandidateConfig>,
}

/// One upstream endpoint, credential, and model
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateConfig {
    /// API root, e.g. `https://api.openai.com/v1`
    pub base_url: Url,
    pub api_key: SecretString,
    /// Upstream model name substituted into the outbound payload
    pub model: String,
    /// Display name, not part of the provider identity
    pub provider_name: String,
    /// Static weight for `weighted` mode
    pub weight: Option<u32>,
}

/// Candidate selection policy for a group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMode {
    /// Roulette draw weighted by live provider score
    #[default]
    ScoreWeighted,
    /// Roulette over the three best scores with exponential weights
    SoftmaxTopK,
    /// First admitted candidate in configured order
    Priority,
    /// Roulette over the static candidate weight
    Weighted,
}
