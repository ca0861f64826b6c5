//! Retry loop over a routing group
//!
//! Each iteration selects a provider not yet tried, invokes it under the
//! per-attempt deadline, and records the outcome against the provider's
//! health before deciding whether to continue. The exclusion set only
//! grows, so the loop ends after at most one attempt per candidate.

use std::{
    collections::HashSet,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use eventsource_stream::Event;
use futures_util::StreamExt;
use switchyard_health::{HealthError, HealthTracker, ProviderRuntimeState, ProviderSelector};
use switchyard_telemetry::metrics::RelayMetrics;

use crate::{
    adapter::ChunkStream,
    error::{AttemptError, RelayError},
    groups::{RoutingCandidate, RoutingGroup},
};

/// Result of a successful attempt sequence
pub struct Relayed<T> {
    pub value: T,
    pub candidate: RoutingCandidate,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// A stream whose first event has already arrived
///
/// The attempt's outcome is still pending: the holder records it through
/// `recorder` once the stream completes or breaks.
pub struct PrimedStream {
    pub first: Event,
    pub rest: ChunkStream,
    pub recorder: AttemptRecorder,
}

/// Records one attempt's outcome against its provider
///
/// Dropping it without recording leaves provider health untouched, which is
/// what a caller-initiated cancellation should do.
pub struct AttemptRecorder {
    tracker: Arc<HealthTracker>,
    metrics: RelayMetrics,
    state: Arc<ProviderRuntimeState>,
    started: Instant,
}

impl AttemptRecorder {
    fn new(tracker: Arc<HealthTracker>, metrics: RelayMetrics, state: Arc<ProviderRuntimeState>) -> Self {
        Self {
            tracker,
            metrics,
            state,
            started: Instant::now(),
        }
    }

    pub fn success(self) {
        let elapsed = self.started.elapsed();
        self.tracker.record_success(&self.state, millis(elapsed));
        self.metrics.attempt(self.state.name(), "success", elapsed.as_secs_f64());
    }

    pub fn failure(self, error: &AttemptError) {
        let elapsed = self.started.elapsed();
        let opened = self.tracker.record_failure(&self.state, millis(elapsed));

        self.metrics.attempt(self.state.name(), "failure", elapsed.as_secs_f64());
        if opened {
            self.metrics.circuit_opened(self.state.name());
        }

        if error.is_mid_stream() {
            tracing::error!(
                provider = %self.state.name(),
                provider_id = %self.state.id(),
                stage = %error.stage(),
                error = %error,
                "upstream failed mid-stream"
            );
        } else {
            tracing::warn!(
                provider = %self.state.name(),
                provider_id = %self.state.id(),
                stage = %error.stage(),
                score = self.state.score(),
                error = %error,
                "upstream attempt failed"
            );
        }
    }
}

struct Attempted<T> {
    value: T,
    candidate: RoutingCandidate,
    recorder: AttemptRecorder,
    attempts: u32,
}

/// Drives selection, invocation, and outcome recording for one request
pub struct FailoverOrchestrator {
    tracker: Arc<HealthTracker>,
    selector: ProviderSelector,
    default_timeout: Option<Duration>,
    metrics: RelayMetrics,
}

impl FailoverOrchestrator {
    pub fn new(tracker: Arc<HealthTracker>, default_timeout: Option<Duration>, metrics: RelayMetrics) -> Self {
        Self {
            selector: ProviderSelector::new(Arc::clone(&tracker)),
            tracker,
            default_timeout,
            metrics,
        }
    }

    /// Run a buffered call with failover, recording success on return
    pub async fn execute<T, F, Fut>(&self, group: &RoutingGroup, invoke: F) -> Result<Relayed<T>, RelayError>
    where
        F: FnMut(RoutingCandidate) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let attempted = self.attempt_loop(group, invoke).await?;
        attempted.recorder.success();

        Ok(Relayed {
            value: attempted.value,
            candidate: attempted.candidate,
            attempts: attempted.attempts,
        })
    }

    /// Open a stream with failover
    ///
    /// An attempt succeeds once its first event arrives. Failures before
    /// that point, including a stream that ends empty, move on to the next
    /// candidate. Everything after is the caller's to record.
    pub async fn execute_stream<F, Fut>(
        &self,
        group: &RoutingGroup,
        mut open: F,
    ) -> Result<Relayed<PrimedStream>, RelayError>
    where
        F: FnMut(RoutingCandidate) -> Fut,
        Fut: Future<Output = Result<ChunkStream, AttemptError>>,
    {
        let attempted = self
            .attempt_loop(group, |candidate| {
                let opening = open(candidate);
                async move {
                    let mut stream = opening.await?;
                    match stream.next().await {
                        Some(Ok(first)) => Ok((first, stream)),
                        Some(Err(e)) => Err(e),
                        None => Err(AttemptError::Stream("upstream closed the stream without data".to_owned())),
                    }
                }
            })
            .await?;

        let (first, rest) = attempted.value;
        let recorder = attempted.recorder;
        self.metrics
            .first_chunk(&attempted.candidate.provider_name, recorder.started.elapsed().as_secs_f64());

        Ok(Relayed {
            value: PrimedStream { first, rest, recorder },
            candidate: attempted.candidate,
            attempts: attempted.attempts,
        })
    }

    async fn attempt_loop<T, F, Fut>(&self, group: &RoutingGroup, mut invoke: F) -> Result<Attempted<T>, RelayError>
    where
        F: FnMut(RoutingCandidate) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let deadline = group.first_token_timeout.or(self.default_timeout);
        let mut tried = HashSet::new();
        let mut attempts = 0;
        let mut last_error = None;

        loop {
            let (candidate, state) = match self.selector.select(&group.name, group.mode, &group.candidates, &tried) {
                Ok((candidate, state)) => (candidate.clone(), state),
                Err(HealthError::ProvidersExhausted { .. }) => {
                    return Err(RelayError::ProvidersExhausted {
                        group: group.name.clone(),
                        attempts,
                        last_error,
                    });
                }
                Err(e @ HealthError::Store(_)) => return Err(RelayError::Internal(e.into())),
            };

            tried.insert(candidate.provider_id.clone());
            attempts += 1;

            tracing::debug!(
                group = %group.name,
                provider = %candidate.provider_name,
                provider_id = %candidate.provider_id,
                score = state.score(),
                attempt = attempts,
                "attempting upstream"
            );

            let recorder = AttemptRecorder::new(Arc::clone(&self.tracker), self.metrics.clone(), state);
            let call = invoke(candidate.clone());

            let outcome = match deadline {
                Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                    Err(AttemptError::Timeout {
                        after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        mid_stream: false,
                    })
                }),
                None => call.await,
            };

            match outcome {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        candidate,
                        recorder,
                        attempts,
                    });
                }
                Err(error) => {
                    recorder.failure(&error);
                    last_error = Some(error);
                }
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn millis(elapsed: Duration) -> f64 {
    elapsed.as_millis() as f64
}
