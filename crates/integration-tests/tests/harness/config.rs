//! Programmatic configuration builder for integration tests

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use secrecy::SecretString;
use switchyard_config::{
    BalanceMode, CandidateConfig, Config, GroupConfig, ServerConfig, UsageLogConfig, UsageLogSink,
};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    ..ServerConfig::default()
                },
                ..Config::default()
            },
        }
    }

    /// Add a routing group
    ///
    /// Each candidate is `(provider_name, base_url, upstream_model)`.
    pub fn with_group(mut self, name: &str, mode: BalanceMode, candidates: &[(&str, &str, &str)]) -> Self {
        self.config.groups.insert(
            name.to_owned(),
            GroupConfig {
                mode,
                match_regex: None,
                first_token_timeout: None,
                candidates: candidates
                    .iter()
                    .map(|(provider_name, base_url, model)| CandidateConfig {
                        base_url: base_url.parse().expect("valid URL"),
                        api_key: SecretString::from(format!("key-{provider_name}")),
                        model: (*model).to_owned(),
                        provider_name: (*provider_name).to_owned(),
                        weight: None,
                    })
                    .collect(),
            },
        );
        self
    }

    /// Resolve model names matching `pattern` to the group
    pub fn with_match_regex(mut self, group: &str, pattern: &str) -> Self {
        self.group(group).match_regex = Some(pattern.to_owned());
        self
    }

    /// Per-attempt deadline for the group
    pub fn with_first_token_timeout(mut self, group: &str, timeout: Duration) -> Self {
        self.group(group).first_token_timeout = Some(timeout);
        self
    }

    /// Consecutive failures before a circuit may open
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.config.health.failure_threshold = threshold;
        self
    }

    /// Write request records to a JSON lines file
    pub fn with_usage_log(mut self, path: PathBuf) -> Self {
        self.config.usage_log = UsageLogConfig {
            sink: UsageLogSink::Jsonl,
            path: Some(path),
            capture_bodies: false,
        };
        self
    }

    /// Price a model in USD per million tokens
    pub fn with_price(mut self, model: &str, input: u32, output: u32) -> Self {
        self.config.pricing.insert(
            model.to_owned(),
            switchyard_config::ModelPrice {
                input: input.into(),
                output: output.into(),
            },
        );
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }

    fn group(&mut self, name: &str) -> &mut GroupConfig {
        self.config.groups.get_mut(name).expect("group added before configuring it")
    }
}
