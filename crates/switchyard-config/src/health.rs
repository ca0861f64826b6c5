use std::time::Duration;

use serde::Deserialize;

/// Provider scoring and circuit breaker tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// EMA smoothing factor in `(0, 1]`
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Latency below which no penalty applies
    #[serde(default = "default_safe_latency_ms")]
    pub safe_latency_ms: f64,
    /// Latency at which the full penalty applies
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: f64,
    /// Consecutive failures before the circuit may open
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Score under which the circuit may open
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// How long an open circuit rejects traffic before probing
    #[serde(default = "default_open_duration", deserialize_with = "crate::duration::deserialize")]
    pub open_duration: Duration,
    /// Admission policy while half-open
    #[serde(default)]
    pub half_open: HalfOpenMode,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            safe_latency_ms: default_safe_latency_ms(),
            max_latency_ms: default_max_latency_ms(),
            failure_threshold: default_failure_threshold(),
            score_threshold: default_score_threshold(),
            open_duration: default_open_duration(),
            half_open: HalfOpenMode::default(),
        }
    }
}

/// How many requests a recovering provider receives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalfOpenMode {
    /// Every request arriving while half-open is admitted
    #[default]
    Shared,
    /// Only the request that performed the transition is admitted
    SingleProbe,
}

const fn default_alpha() -> f64 {
    0.2
}

const fn default_safe_latency_ms() -> f64 {
    5000.0
}

const fn default_max_latency_ms() -> f64 {
    30000.0
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_score_threshold() -> f64 {
    40.0
}

const fn default_open_duration() -> Duration {
    Duration::from_secs(30)
}
