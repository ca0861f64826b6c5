use std::sync::{
    Mutex,
    atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::{ProviderId, now_ms};

/// Circuit breaker position for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum CircuitState {
    /// Normal operation, requests flow through
    Closed = 0,
    /// Provider is failing, requests are blocked
    Open = 1,
    /// Open duration elapsed, probing for recovery
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Smoothed signals, always updated together with the score
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ema {
    /// `None` until the first latency sample
    pub latency_ms: Option<f64>,
    pub success_rate: f64,
    pub score: f64,
}

impl Default for Ema {
    fn default() -> Self {
        Self {
            latency_ms: None,
            success_rate: 1.0,
            score: 100.0,
        }
    }
}

/// Live health record for one provider, shared by all requests
pub struct ProviderRuntimeState {
    id: ProviderId,
    name: String,
    pub(crate) total: AtomicU64,
    pub(crate) success: AtomicU64,
    pub(crate) failure: AtomicU64,
    /// Failures since the last success, drives the circuit threshold
    pub(crate) consecutive_failures: AtomicU32,
    pub(crate) ema: Mutex<Ema>,
    pub(crate) circuit: AtomicU8,
    /// 0 while never opened
    pub(crate) opened_at_ms: AtomicU64,
    /// Start of the current half-open probe lease
    pub(crate) probe_started_at_ms: AtomicU64,
    pub(crate) updated_at_ms: AtomicU64,
}

impl ProviderRuntimeState {
    /// Fresh state: score 100, circuit closed
    pub fn new(id: ProviderId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            ema: Mutex::new(Ema::default()),
            circuit: AtomicU8::new(CircuitState::Closed as u8),
            opened_at_ms: AtomicU64::new(0),
            probe_started_at_ms: AtomicU64::new(0),
            updated_at_ms: AtomicU64::new(now_ms()),
        }
    }

    /// Rebuild state from a persisted snapshot
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        let mut state = Self::new(snapshot.provider_id.clone(), snapshot.provider_name.clone());

        state.total.store(snapshot.total_requests, Ordering::Relaxed);
        state.success.store(snapshot.success_requests, Ordering::Relaxed);
        state.failure.store(snapshot.failure_requests, Ordering::Relaxed);
        state
            .consecutive_failures
            .store(snapshot.consecutive_failures, Ordering::Relaxed);
        state.circuit.store(snapshot.circuit_state as u8, Ordering::Relaxed);
        state
            .opened_at_ms
            .store(snapshot.circuit_opened_at_ms.unwrap_or(0), Ordering::Relaxed);
        state.updated_at_ms.store(snapshot.updated_at_ms, Ordering::Relaxed);

        *state.ema.get_mut().unwrap_or_else(|e| e.into_inner()) = Ema {
            latency_ms: snapshot.latency_ema_ms,
            success_rate: snapshot.success_rate_ema.clamp(0.0, 1.0),
            score: snapshot.score.clamp(0.0, 100.0),
        };

        state
    }

    pub fn id(&self) -> &ProviderId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn score(&self) -> f64 {
        self.ema().score
    }

    pub fn circuit_state(&self) -> CircuitState {
        CircuitState::from_u8(self.circuit.load(Ordering::Acquire))
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn total_requests(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn success_requests(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure_requests(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    pub(crate) fn ema(&self) -> Ema {
        *self.ema.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Point-in-time copy for persistence and diagnostics
    ///
    /// Fields are read independently, so a snapshot taken during an update
    /// may be slightly torn. Persistence tolerates that.
    pub fn snapshot(&self) -> StateSnapshot {
        let ema = self.ema();
        let opened_at = self.opened_at_ms.load(Ordering::Relaxed);

        StateSnapshot {
            provider_id: self.id.clone(),
            provider_name: self.name.clone(),
            total_requests: self.total_requests(),
            success_requests: self.success_requests(),
            failure_requests: self.failure_requests(),
            consecutive_failures: self.consecutive_failures(),
            latency_ema_ms: ema.latency_ms,
            success_rate_ema: ema.success_rate,
            score: ema.score,
            circuit_state: self.circuit_state(),
            circuit_opened_at_ms: (opened_at != 0).then_some(opened_at),
            updated_at_ms: self.updated_at_ms.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ProviderRuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRuntimeState")
            .field("id", &self.id)
            .field("score", &self.score())
            .field("circuit", &self.circuit_state())
            .finish_non_exhaustive()
    }
}

/// Serializable view of a [`ProviderRuntimeState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub total_requests: u64,
    pub success_requests: u64,
    pub failure_requests: u64,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub latency_ema_ms: Option<f64>,
    pub success_rate_ema: f64,
    pub score: f64,
    pub circuit_state: CircuitState,
    pub circuit_opened_at_ms: Option<u64>,
    pub updated_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_healthy() {
        let state = ProviderRuntimeState::new(ProviderId::from("p"), "primary");
        assert!((state.score() - 100.0).abs() < f64::EPSILON);
        assert_eq!(state.circuit_state(), CircuitState::Closed);
        assert_eq!(state.total_requests(), 0);
        assert!(state.snapshot().latency_ema_ms.is_none());
    }

    #[test]
    fn snapshot_restores_counters_and_circuit() {
        let state = ProviderRuntimeState::new(ProviderId::from("p"), "primary");
        state.total.store(12, Ordering::Relaxed);
        state.success.store(5, Ordering::Relaxed);
        state.failure.store(7, Ordering::Relaxed);
        state.circuit.store(CircuitState::Open as u8, Ordering::Relaxed);
        state.opened_at_ms.store(1_700_000_000_000, Ordering::Relaxed);

        let restored = ProviderRuntimeState::from_snapshot(&state.snapshot());

        assert_eq!(restored.snapshot(), state.snapshot());
        assert_eq!(restored.circuit_state(), CircuitState::Open);
        assert_eq!(restored.name(), "primary");
    }

    #[test]
    fn circuit_state_serializes_upper_case() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"HALF_OPEN\"");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }
}
