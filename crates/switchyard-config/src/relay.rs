use std::time::Duration;

use serde::Deserialize;

/// Upstream call behavior shared by all routing groups
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Per-attempt deadline used when a group sets no `first_token_timeout`
    #[serde(default, deserialize_with = "crate::duration::deserialize_opt")]
    pub request_timeout: Option<Duration>,
    /// TCP connect timeout for upstream connections
    #[serde(default = "default_connect_timeout", deserialize_with = "crate::duration::deserialize")]
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            connect_timeout: default_connect_timeout(),
        }
    }
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}
