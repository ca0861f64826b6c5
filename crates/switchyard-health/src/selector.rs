use std::{collections::HashSet, sync::Arc};

use rand::Rng;
use switchyard_config::BalanceMode;

use crate::{HealthError, HealthTracker, ProviderId, ProviderRuntimeState, now_ms};

/// Candidates considered by `softmax_top_k`
const TOP_K: usize = 3;
/// Softmax temperature over 0..100 scores
const SOFTMAX_TEMPERATURE: f64 = 10.0;

/// Anything the selector can route to
pub trait SelectionCandidate {
    fn provider_id(&self) -> &ProviderId;

    fn provider_name(&self) -> &str;

    /// Static weight for [`BalanceMode::Weighted`]
    fn weight(&self) -> u32 {
        1
    }
}

/// Picks one admitted candidate from a group
pub struct ProviderSelector {
    tracker: Arc<HealthTracker>,
}

struct Admitted<'a, C> {
    index: usize,
    candidate: &'a C,
    state: Arc<ProviderRuntimeState>,
}

impl ProviderSelector {
    pub fn new(tracker: Arc<HealthTracker>) -> Self {
        Self { tracker }
    }

    /// Choose a candidate not in `excluded` whose circuit admits traffic
    ///
    /// # Errors
    ///
    /// Returns [`HealthError::ProvidersExhausted`] when nothing is admitted
    pub fn select<'a, C: SelectionCandidate>(
        &self,
        group: &str,
        mode: BalanceMode,
        candidates: &'a [C],
        excluded: &HashSet<ProviderId>,
    ) -> Result<(&'a C, Arc<ProviderRuntimeState>), HealthError> {
        self.select_with(group, mode, candidates, excluded, &mut rand::rng())
    }

    /// [`Self::select`] with a caller-provided random source
    pub fn select_with<'a, C: SelectionCandidate, R: Rng>(
        &self,
        group: &str,
        mode: BalanceMode,
        candidates: &'a [C],
        excluded: &HashSet<ProviderId>,
        rng: &mut R,
    ) -> Result<(&'a C, Arc<ProviderRuntimeState>), HealthError> {
        let circuit = self.tracker.circuit();
        let mut refused = HashSet::new();

        // Admission is checked without side effects first, then claimed for
        // the pick only. A refused claim (lost half-open race) re-draws.
        loop {
            let now = now_ms();
            let admitted: Vec<_> = candidates
                .iter()
                .enumerate()
                .filter(|(index, candidate)| !refused.contains(index) && !excluded.contains(candidate.provider_id()))
                .map(|(index, candidate)| Admitted {
                    index,
                    candidate,
                    state: self.tracker.state(candidate.provider_id(), candidate.provider_name()),
                })
                .filter(|admitted| circuit.is_admissible_at(&admitted.state, now))
                .collect();

            if admitted.is_empty() {
                return Err(HealthError::ProvidersExhausted {
                    group: group.to_owned(),
                });
            }

            let chosen = &admitted[pick(mode, &admitted, rng)];

            if circuit.allow_request_at(&chosen.state, now) {
                tracing::debug!(
                    group,
                    provider = %chosen.candidate.provider_name(),
                    score = chosen.state.score(),
                    admitted = admitted.len(),
                    "selected provider"
                );
                return Ok((chosen.candidate, Arc::clone(&chosen.state)));
            }

            refused.insert(chosen.index);
        }
    }
}

fn pick<C: SelectionCandidate, R: Rng>(mode: BalanceMode, admitted: &[Admitted<'_, C>], rng: &mut R) -> usize {
    match mode {
        BalanceMode::Priority => 0,
        BalanceMode::ScoreWeighted => {
            let weights: Vec<f64> = admitted.iter().map(|a| a.state.score().max(0.0)).collect();
            roulette(&weights, rng)
        }
        BalanceMode::Weighted => {
            let weights: Vec<f64> = admitted.iter().map(|a| f64::from(a.candidate.weight())).collect();
            roulette(&weights, rng)
        }
        BalanceMode::SoftmaxTopK => {
            let mut ranked: Vec<usize> = (0..admitted.len()).collect();
            ranked.sort_by(|&a, &b| admitted[b].state.score().total_cmp(&admitted[a].state.score()));
            ranked.truncate(TOP_K);

            let weights: Vec<f64> = ranked
                .iter()
                .map(|&i| (admitted[i].state.score() / SOFTMAX_TEMPERATURE).exp())
                .collect();

            ranked[roulette(&weights, rng)]
        }
    }
}

/// Weighted draw, uniform when every weight is zero
fn roulette<R: Rng>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();

    if total <= 0.0 || !total.is_finite() {
        return rng.random_range(0..weights.len());
    }

    walk(weights, rng.random_range(0.0..total))
}

/// First index whose cumulative weight exceeds `draw`
fn walk(weights: &[f64], draw: f64) -> usize {
    let mut cumulative = 0.0;

    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if cumulative > draw {
            return index;
        }
    }

    weights.len() - 1
}
