use std::sync::Arc;

use switchyard_config::HealthConfig;

use crate::{CircuitBreaker, ProviderId, ProviderRuntimeState, ProviderStateRegistry, ScoreCalculator};

/// Registry plus the rules that mutate it
///
/// The relay holds one of these and reports every attempt outcome here.
pub struct HealthTracker {
    registry: Arc<ProviderStateRegistry>,
    score: ScoreCalculator,
    circuit: CircuitBreaker,
}

impl HealthTracker {
    pub fn new(registry: Arc<ProviderStateRegistry>, config: &HealthConfig) -> Self {
        Self {
            registry,
            score: ScoreCalculator::new(config),
            circuit: CircuitBreaker::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderStateRegistry> {
        &self.registry
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    pub fn state(&self, id: &ProviderId, name: &str) -> Arc<ProviderRuntimeState> {
        self.registry.get_or_create(id, name)
    }

    pub fn record_success(&self, state: &ProviderRuntimeState, latency_ms: f64) {
        let score = self.score.update(state, true, latency_ms);
        self.circuit.on_success(state);

        tracing::debug!(provider = %state.name(), latency_ms, score, "recorded provider success");
    }

    /// Returns `true` if this failure opened the provider's circuit
    pub fn record_failure(&self, state: &ProviderRuntimeState, latency_ms: f64) -> bool {
        let score = self.score.update(state, false, latency_ms);
        let opened = self.circuit.on_failure(state);

        tracing::debug!(
            provider = %state.name(),
            latency_ms,
            score,
            consecutive_failures = state.consecutive_failures(),
            "recorded provider failure"
        );

        opened
    }
}
