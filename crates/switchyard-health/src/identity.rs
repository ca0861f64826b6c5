use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable key for health tracking
///
/// Derived from the upstream base URL, a fingerprint of the credential, and
/// the upstream model name. Candidates sharing that triple share health
/// state even when configured in different groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn derive(base_url: &str, api_key: &str, model: &str) -> Self {
        let digest = Sha256::digest(api_key.as_bytes());
        let fingerprint: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();

        Self(format!("{}#{fingerprint}#{model}", base_url.trim_end_matches('/')))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}
