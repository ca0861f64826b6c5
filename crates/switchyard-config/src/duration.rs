use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Deserialize a human duration such as `"30s"` or `"1m"`
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(&raw).map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}

/// Same as [`deserialize`] for optional fields
pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    duration_str::parse(&raw)
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}
