use std::sync::atomic::Ordering;

use switchyard_config::{HalfOpenMode, HealthConfig};

use crate::{CircuitState, ProviderRuntimeState, now_ms};

/// Admission gate over a provider's circuit fields
///
/// Transitions happen on admission checks and outcome reports, never on a
/// timer: an open circuit only becomes half-open when a request asks.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    score_threshold: f64,
    open_duration_ms: u64,
    half_open: HalfOpenMode,
}

impl CircuitBreaker {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            score_threshold: config.score_threshold,
            open_duration_ms: u64::try_from(config.open_duration.as_millis()).unwrap_or(u64::MAX),
            half_open: config.half_open,
        }
    }

    /// Whether a request may be sent to this provider now
    ///
    /// May move an open circuit to half-open.
    pub fn allow_request(&self, state: &ProviderRuntimeState) -> bool {
        self.allow_request_at(state, now_ms())
    }

    pub(crate) fn allow_request_at(&self, state: &ProviderRuntimeState, now: u64) -> bool {
        match state.circuit_state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if !self.open_elapsed(state, now) {
                    return false;
                }

                let won = state
                    .circuit
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok();

                if won {
                    state.probe_started_at_ms.store(now, Ordering::Release);
                    tracing::warn!(provider = %state.name(), provider_id = %state.id(), "circuit half-open, probing provider");
                    return true;
                }

                // Another request performed the transition
                self.half_open == HalfOpenMode::Shared && state.circuit_state() == CircuitState::HalfOpen
            }
            CircuitState::HalfOpen => match self.half_open {
                HalfOpenMode::Shared => true,
                HalfOpenMode::SingleProbe => self.renew_probe_lease(state, now),
            },
        }
    }

    /// Side-effect free version of [`Self::allow_request`] used for filtering
    pub(crate) fn is_admissible_at(&self, state: &ProviderRuntimeState, now: u64) -> bool {
        match state.circuit_state() {
            CircuitState::Closed => true,
            CircuitState::Open => self.open_elapsed(state, now),
            CircuitState::HalfOpen => match self.half_open {
                HalfOpenMode::Shared => true,
                HalfOpenMode::SingleProbe => self.probe_lease_expired(state, now),
            },
        }
    }

    /// Close the circuit after a successful attempt
    pub fn on_success(&self, state: &ProviderRuntimeState) {
        state.consecutive_failures.store(0, Ordering::Release);

        let previous = state.circuit.swap(CircuitState::Closed as u8, Ordering::AcqRel);
        if CircuitState::from_u8(previous) != CircuitState::Closed {
            state.opened_at_ms.store(0, Ordering::Release);
            state.probe_started_at_ms.store(0, Ordering::Release);
            tracing::info!(provider = %state.name(), provider_id = %state.id(), "circuit closed");
        }
    }

    /// Re-evaluate the open condition after a failed attempt
    ///
    /// Expects the failure to have been recorded by the score calculator
    /// already. Returns `true` if this call opened the circuit.
    pub fn on_failure(&self, state: &ProviderRuntimeState) -> bool {
        self.on_failure_at(state, now_ms())
    }

    pub(crate) fn on_failure_at(&self, state: &ProviderRuntimeState, now: u64) -> bool {
        let failures = state.consecutive_failures();
        let score = state.score();

        if failures < self.failure_threshold || score >= self.score_threshold {
            return false;
        }

        state.opened_at_ms.store(now, Ordering::Release);
        state.probe_started_at_ms.store(0, Ordering::Release);
        let previous = state.circuit.swap(CircuitState::Open as u8, Ordering::AcqRel);

        if CircuitState::from_u8(previous) == CircuitState::Open {
            return false;
        }

        tracing::warn!(
            provider = %state.name(),
            provider_id = %state.id(),
            consecutive_failures = failures,
            score,
            "circuit opened for provider"
        );

        true
    }

    fn open_elapsed(&self, state: &ProviderRuntimeState, now: u64) -> bool {
        let opened_at = state.opened_at_ms.load(Ordering::Acquire);
        now.saturating_sub(opened_at) > self.open_duration_ms
    }

    fn probe_lease_expired(&self, state: &ProviderRuntimeState, now: u64) -> bool {
        let started = state.probe_started_at_ms.load(Ordering::Acquire);
        now.saturating_sub(started) > self.open_duration_ms
    }

    /// Hand the probe to a new request if the previous one never reported back
    fn renew_probe_lease(&self, state: &ProviderRuntimeState, now: u64) -> bool {
        let started = state.probe_started_at_ms.load(Ordering::Acquire);
        if now.saturating_sub(started) <= self.open_duration_ms {
            return false;
        }

        state
            .probe_started_at_ms
            .compare_exchange(started, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{ProviderId, ScoreCalculator};

    const OPEN_MS: u64 = 30_000;

    fn config(half_open: HalfOpenMode) -> HealthConfig {
        HealthConfig {
            open_duration: Duration::from_millis(OPEN_MS),
            half_open,
            ..HealthConfig::default()
        }
    }

    fn tripped(breaker: &CircuitBreaker, at: u64) -> ProviderRuntimeState {
        let state = ProviderRuntimeState::new(ProviderId::from("p"), "p");
        let calc = ScoreCalculator::new(&HealthConfig::default());
        let mut opened = false;
        for _ in 0..5 {
            calc.update(&state, false, 100.0);
            opened |= breaker.on_failure_at(&state, at);
        }
        assert!(opened);
        state
    }

    #[test]
    fn closed_circuit_admits() {
        let breaker = CircuitBreaker::new(&config(HalfOpenMode::Shared));
        let state = ProviderRuntimeState::new(ProviderId::from("p"), "p");
        assert!(breaker.allow_request(&state));
    }

    #[test]
    fn fewer_than_threshold_failures_keep_circuit_closed() {
        let breaker = CircuitBreaker::new(&config(HalfOpenMode::Shared));
        let calc = ScoreCalculator::new(&HealthConfig::default());
        let state = ProviderRuntimeState::new(ProviderId::from("p"), "p");

        for _ in 0..4 {
            calc.update(&state, false, 100.0);
            assert!(!breaker.on_failure(&state));
        }
        assert_eq!(state.circuit_state(), CircuitState::Closed);
    }

    #[test]
    fn high_score_keeps_circuit_closed() {
        let breaker = CircuitBreaker::new(&config(HalfOpenMode::Shared));
        let state = ProviderRuntimeState::new(ProviderId::from("p"), "p");
        state.consecutive_failures.store(10, Ordering::Relaxed);
        assert!(!breaker.on_failure(&state));
        assert_eq!(state.circuit_state(), CircuitState::Closed);
    }

    #[test]
    fn open_circuit_rejects_until_duration_elapses() {
        let breaker = CircuitBreaker::new(&config(HalfOpenMode::Shared));
        let opened_at = 1_000_000;
        let state = tripped(&breaker, opened_at);

        assert_eq!(state.circuit_state(), CircuitState::Open);
        assert!(!breaker.allow_request_at(&state, opened_at));
        assert!(!breaker.allow_request_at(&state, opened_at + OPEN_MS));
        assert!(breaker.allow_request_at(&state, opened_at + OPEN_MS + 1));
        assert_eq!(state.circuit_state(), CircuitState::HalfOpen);
    }

    #[test]
    fn success_closes_half_open_circuit() {
        let breaker = CircuitBreaker::new(&config(HalfOpenMode::Shared));
        let state = tripped(&breaker, 0);
        assert!(breaker.allow_request_at(&state, OPEN_MS + 1));

        breaker.on_success(&state);

        assert_eq!(state.circuit_state(), CircuitState::Closed);
        assert_eq!(state.consecutive_failures(), 0);
        assert!(breaker.allow_request(&state));
    }

    #[test]
    fn failed_probe_reopens_immediately() {
        let breaker = CircuitBreaker::new(&config(HalfOpenMode::Shared));
        let calc = ScoreCalculator::new(&HealthConfig::default());
        let state = tripped(&breaker, 0);
        let probe_at = OPEN_MS + 1;
        assert!(breaker.allow_request_at(&state, probe_at));

        calc.update(&state, false, 100.0);
        assert!(breaker.on_failure_at(&state, probe_at));

        assert_eq!(state.circuit_state(), CircuitState::Open);
        assert!(!breaker.allow_request_at(&state, probe_at + 1));
    }

    #[test]
    fn shared_half_open_admits_concurrent_probes() {
        let breaker = CircuitBreaker::new(&config(HalfOpenMode::Shared));
        let state = tripped(&breaker, 0);
        let now = OPEN_MS + 1;

        assert!(breaker.allow_request_at(&state, now));
        assert!(breaker.allow_request_at(&state, now));
        assert!(breaker.allow_request_at(&state, now));
    }

    #[test]
    fn single_probe_admits_one_request_per_lease() {
        let breaker = CircuitBreaker::new(&config(HalfOpenMode::SingleProbe));
        let state = tripped(&breaker, 0);
        let now = OPEN_MS + 1;

        assert!(breaker.allow_request_at(&state, now));
        assert!(!breaker.allow_request_at(&state, now + 10));
        assert!(!breaker.is_admissible_at(&state, now + 10));

        // Probe never reported back, lease expires
        let later = now + OPEN_MS + 1;
        assert!(breaker.is_admissible_at(&state, later));
        assert!(breaker.allow_request_at(&state, later));
        assert!(!breaker.allow_request_at(&state, later));
    }

    #[test]
    fn single_probe_transition_has_one_winner_under_contention() {
        let breaker = CircuitBreaker::new(&config(HalfOpenMode::SingleProbe));
        let state = Arc::new(tripped(&breaker, 0));
        let now = OPEN_MS + 1;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || breaker.allow_request_at(&state, now))
            })
            .collect();

        let admitted = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(admitted, 1);
        assert_eq!(state.circuit_state(), CircuitState::HalfOpen);
    }
}
