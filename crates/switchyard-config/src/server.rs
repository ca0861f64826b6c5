use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP listener configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind, defaults to `0.0.0.0:3000`
    pub listen_address: Option<SocketAddr>,
    /// Liveness endpoint
    #[serde(default)]
    pub health: HealthEndpointConfig,
    /// Expose the provider runtime-state snapshot at `/internal/providers`
    #[serde(default = "default_enabled")]
    pub expose_provider_state: bool,
    /// Maximum accepted request body in bytes
    #[serde(default = "default_body_limit")]
    pub request_body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            health: HealthEndpointConfig::default(),
            expose_provider_state: true,
            request_body_limit: default_body_limit(),
        }
    }
}

/// Liveness endpoint configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthEndpointConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for HealthEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_path(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

fn default_path() -> String {
    "/health".to_owned()
}

const fn default_body_limit() -> usize {
    16 * 1024 * 1024
}
