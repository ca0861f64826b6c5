//! Provider health tracking for the relay
//!
//! Every upstream endpoint, credential, and model triple gets one shared
//! [`ProviderRuntimeState`]. Request outcomes feed exponential moving
//! averages into a bounded score, a circuit breaker gates admission, and a
//! selector picks among admitted candidates by score.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod circuit;
mod error;
mod identity;
mod persistence;
mod registry;
mod score;
mod selector;
mod state;
pub mod store;
mod tracker;

use std::time::{SystemTime, UNIX_EPOCH};

pub use circuit::CircuitBreaker;
pub use error::HealthError;
pub use identity::ProviderId;
pub use persistence::PersistenceJob;
pub use registry::ProviderStateRegistry;
pub use score::ScoreCalculator;
pub use selector::{ProviderSelector, SelectionCandidate};
pub use state::{CircuitState, ProviderRuntimeState, StateSnapshot};
pub use store::StateStore;
pub use tracker::HealthTracker;

/// Wall-clock milliseconds since the unix epoch
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
