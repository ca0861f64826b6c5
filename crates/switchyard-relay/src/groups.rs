use std::{sync::Arc, time::Duration};

use indexmap::IndexMap;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use switchyard_config::{BalanceMode, GroupConfig};
use switchyard_health::{ProviderId, SelectionCandidate};
use url::Url;

/// One concrete upstream a group may route to
#[derive(Debug, Clone)]
pub struct RoutingCandidate {
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub base_url: Url,
    pub api_key: SecretString,
    /// Upstream model name substituted into the outbound request
    pub model: String,
    pub weight: u32,
}

impl SelectionCandidate for RoutingCandidate {
    fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn weight(&self) -> u32 {
        self.weight
    }
}

/// A logical model and its candidates, immutable once built
#[derive(Debug)]
pub struct RoutingGroup {
    pub name: String,
    pub mode: BalanceMode,
    pub first_token_timeout: Option<Duration>,
    pub candidates: Vec<RoutingCandidate>,
}

/// Resolves a requested model name to its routing group
pub trait GroupResolver: Send + Sync {
    fn resolve(&self, model: &str) -> Option<Arc<RoutingGroup>>;
}

/// Groups from the `[groups]` config table
///
/// Exact names win; otherwise the first group whose `match_regex` matches,
/// in configuration order.
pub struct StaticGroups {
    by_name: IndexMap<String, Arc<RoutingGroup>>,
    patterns: Vec<(Regex, Arc<RoutingGroup>)>,
}

impl StaticGroups {
    /// Build groups from config, deriving each candidate's provider identity
    ///
    /// # Errors
    ///
    /// Returns an error when a `match_regex` does not compile
    pub fn from_config(groups: &IndexMap<String, GroupConfig>) -> anyhow::Result<Self> {
        let mut by_name = IndexMap::with_capacity(groups.len());
        let mut patterns = Vec::new();

        for (name, config) in groups {
            let group = Arc::new(RoutingGroup {
                name: name.clone(),
                mode: config.mode,
                first_token_timeout: config.first_token_timeout,
                candidates: config
                    .candidates
                    .iter()
                    .map(|candidate| RoutingCandidate {
                        provider_id: ProviderId::derive(
                            candidate.base_url.as_str(),
                            candidate.api_key.expose_secret(),
                            &candidate.model,
                        ),
                        provider_name: candidate.provider_name.clone(),
                        base_url: candidate.base_url.clone(),
                        api_key: candidate.api_key.clone(),
                        model: candidate.model.clone(),
                        weight: candidate.weight.unwrap_or(1),
                    })
                    .collect(),
            });

            if let Some(pattern) = &config.match_regex {
                let regex = Regex::new(pattern)
                    .map_err(|e| anyhow::anyhow!("group '{name}' has an invalid match_regex: {e}"))?;
                patterns.push((regex, Arc::clone(&group)));
            }

            by_name.insert(name.clone(), group);
        }

        Ok(Self { by_name, patterns })
    }
}

impl GroupResolver for StaticGroups {
    fn resolve(&self, model: &str) -> Option<Arc<RoutingGroup>> {
        if let Some(group) = self.by_name.get(model) {
            return Some(Arc::clone(group));
        }

        self.patterns
            .iter()
            .find(|(regex, _)| regex.is_match(model))
            .map(|(_, group)| Arc::clone(group))
    }
}
