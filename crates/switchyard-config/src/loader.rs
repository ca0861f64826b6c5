use std::path::Path;

use crate::{Config, PersistenceBackend, UsageLogSink};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_groups()?;
        self.validate_health()?;
        self.validate_persistence()?;
        self.validate_usage_log()?;
        Ok(())
    }

    fn validate_groups(&self) -> anyhow::Result<()> {
        if self.groups.is_empty() {
            anyhow::bail!("at least one routing group must be configured");
        }

        for (name, group) in &self.groups {
            if group.candidates.is_empty() {
                anyhow::bail!("group '{name}' has no candidates");
            }

            if let Some(ref pattern) = group.match_regex {
                regex::Regex::new(pattern)
                    .map_err(|e| anyhow::anyhow!("invalid match_regex for group '{name}': {e}"))?;
            }

            if group.first_token_timeout.is_some_and(|t| t.is_zero()) {
                anyhow::bail!("group '{name}': first_token_timeout must be greater than 0");
            }
        }

        Ok(())
    }

    fn validate_health(&self) -> anyhow::Result<()> {
        let health = &self.health;

        if !(health.alpha > 0.0 && health.alpha <= 1.0) {
            anyhow::bail!("health.alpha must be in (0, 1], got {}", health.alpha);
        }

        if health.max_latency_ms <= health.safe_latency_ms {
            anyhow::bail!("health.max_latency_ms must be greater than health.safe_latency_ms");
        }

        if health.failure_threshold == 0 {
            anyhow::bail!("health.failure_threshold must be greater than 0");
        }

        Ok(())
    }

    fn validate_persistence(&self) -> anyhow::Result<()> {
        match self.persistence.backend {
            PersistenceBackend::File if self.persistence.path.is_none() => {
                anyhow::bail!("persistence.path is required for the file backend")
            }
            PersistenceBackend::Redis if self.persistence.url.is_none() => {
                anyhow::bail!("persistence.url is required for the redis backend")
            }
            _ if self.persistence.flush_interval.is_zero() => {
                anyhow::bail!("persistence.flush_interval must be greater than 0")
            }
            _ => Ok(()),
        }
    }

    fn validate_usage_log(&self) -> anyhow::Result<()> {
        if self.usage_log.sink == UsageLogSink::Jsonl && self.usage_log.path.is_none() {
            anyhow::bail!("usage_log.path is required for the jsonl sink");
        }

        Ok(())
    }
}
