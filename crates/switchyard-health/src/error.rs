use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealthError {
    /// Every candidate was already tried or is refused by its circuit
    #[error("no available provider in group '{group}'")]
    ProvidersExhausted { group: String },
    /// Runtime-state store failure
    #[error("state store: {0}")]
    Store(String),
}
