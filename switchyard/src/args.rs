use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use switchyard_config::Config;

/// Switchyard LLM gateway
#[derive(Debug, Parser)]
#[command(name = "switchyard", about = "Health-aware failover gateway for LLM APIs")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchyard.toml", env = "SWITCHYARD_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "SWITCHYARD_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Default log filter when `RUST_LOG` is unset
    #[arg(long, default_value = "info", env = "SWITCHYARD_LOG")]
    pub log: String,
}

impl Args {
    /// Read the config file and apply command-line overrides
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.server.listen_address = Some(listen);
        }
    }
}
