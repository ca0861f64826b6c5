#![allow(clippy::must_use_candidate)]

mod duration;
mod env;
pub mod groups;
pub mod health;
mod loader;
pub mod persistence;
pub mod pricing;
pub mod relay;
pub mod server;
pub mod telemetry;
pub mod usage_log;

use indexmap::IndexMap;
use serde::Deserialize;

pub use groups::*;
pub use health::*;
pub use persistence::*;
pub use pricing::*;
pub use relay::*;
pub use server::*;
pub use telemetry::*;
pub use usage_log::*;

/// Top-level switchyard configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream call behavior shared by all groups
    #[serde(default)]
    pub relay: RelayConfig,
    /// Provider scoring and circuit breaker tuning
    #[serde(default)]
    pub health: HealthConfig,
    /// Where provider runtime state is snapshotted
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Request log sink
    #[serde(default)]
    pub usage_log: UsageLogConfig,
    /// Routing groups keyed by logical model name
    #[serde(default)]
    pub groups: IndexMap<String, GroupConfig>,
    /// Per-model token prices keyed by upstream model name
    #[serde(default)]
    pub pricing: IndexMap<String, ModelPrice>,
    /// Logging and OTLP export
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
