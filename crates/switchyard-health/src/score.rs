use std::sync::atomic::Ordering;

use switchyard_config::HealthConfig;

use crate::{ProviderRuntimeState, now_ms, state::Ema};

/// Weight of the success-rate EMA in the score
const SUCCESS_WEIGHT: f64 = 70.0;
/// Maximum points lost to latency
const LATENCY_WEIGHT: f64 = 20.0;
/// Maximum points lost to the lifetime failure ratio
const FAILURE_WEIGHT: f64 = 10.0;

/// Folds one request outcome into a provider's smoothed signals
#[derive(Debug, Clone, Copy)]
pub struct ScoreCalculator {
    alpha: f64,
    safe_latency_ms: f64,
    max_latency_ms: f64,
}

impl ScoreCalculator {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            alpha: config.alpha,
            safe_latency_ms: config.safe_latency_ms,
            max_latency_ms: config.max_latency_ms,
        }
    }

    /// Record one completed attempt and return the new score
    ///
    /// Counters are bumped atomically. The EMA read-modify-write and the
    /// score derived from it happen under the state's lock so concurrent
    /// completions cannot lose each other's update.
    pub fn update(&self, state: &ProviderRuntimeState, success: bool, latency_ms: f64) -> f64 {
        state.total.fetch_add(1, Ordering::AcqRel);
        if success {
            state.success.fetch_add(1, Ordering::AcqRel);
        } else {
            state.failure.fetch_add(1, Ordering::AcqRel);
            state.consecutive_failures.fetch_add(1, Ordering::AcqRel);
        }

        let mut ema = state.ema.lock().unwrap_or_else(|e| e.into_inner());

        let latency = latency_ms.max(0.0);
        ema.latency_ms = Some(match ema.latency_ms {
            Some(previous) => self.alpha.mul_add(latency, (1.0 - self.alpha) * previous),
            None => latency,
        });

        let observed = if success { 1.0 } else { 0.0 };
        ema.success_rate = self.alpha.mul_add(observed, (1.0 - self.alpha) * ema.success_rate);

        let total = state.total.load(Ordering::Acquire);
        let failures = state.failure.load(Ordering::Acquire);
        ema.score = self.score(&ema, failures, total);

        state.updated_at_ms.store(now_ms(), Ordering::Relaxed);

        ema.score
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(&self, ema: &Ema, failures: u64, total: u64) -> f64 {
        let latency = ema.latency_ms.unwrap_or(0.0);
        let latency_penalty =
            ((latency - self.safe_latency_ms) / (self.max_latency_ms - self.safe_latency_ms)).clamp(0.0, 1.0);
        let failure_burst = failures as f64 / total.max(1) as f64;

        (ema.success_rate * SUCCESS_WEIGHT - latency_penalty * LATENCY_WEIGHT - failure_burst * FAILURE_WEIGHT)
            .clamp(0.0, 100.0)
    }
}
