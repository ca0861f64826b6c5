use std::path::PathBuf;

use serde::Deserialize;

/// Request log sink configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsageLogConfig {
    #[serde(default)]
    pub sink: UsageLogSink,
    /// Output file for the `jsonl` sink
    pub path: Option<PathBuf>,
    /// Record request and response bodies alongside metadata
    #[serde(default)]
    pub capture_bodies: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLogSink {
    /// Emit one structured `tracing` event per request
    #[default]
    Tracing,
    /// Append one JSON object per line to a file
    Jsonl,
}
