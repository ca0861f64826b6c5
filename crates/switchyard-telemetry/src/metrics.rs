//! Relay metric instruments
//!
//! Instruments come from the global meter provider, so they record into a
//! no-op provider unless an OTLP exporter is configured.

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

pub const RELAY_ATTEMPT_COUNT: &str = "relay.attempt.count";
pub const RELAY_ATTEMPT_DURATION: &str = "relay.attempt.duration";
pub const RELAY_CIRCUIT_OPENED: &str = "relay.circuit.opened";
pub const RELAY_TIME_TO_FIRST_CHUNK: &str = "relay.time_to_first_chunk";

/// Instruments recorded by the failover orchestrator
#[derive(Clone)]
pub struct RelayMetrics {
    attempts: Counter<u64>,
    attempt_duration: Histogram<f64>,
    circuit_opened: Counter<u64>,
    time_to_first_chunk: Histogram<f64>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        let meter = global::meter("switchyard");

        Self {
            attempts: meter
                .u64_counter(RELAY_ATTEMPT_COUNT)
                .with_description("Upstream attempts by provider and outcome")
                .build(),
            attempt_duration: meter
                .f64_histogram(RELAY_ATTEMPT_DURATION)
                .with_unit("s")
                .with_description("Upstream attempt latency")
                .build(),
            circuit_opened: meter
                .u64_counter(RELAY_CIRCUIT_OPENED)
                .with_description("Circuit breaker openings")
                .build(),
            time_to_first_chunk: meter
                .f64_histogram(RELAY_TIME_TO_FIRST_CHUNK)
                .with_unit("s")
                .with_description("Latency until the first streamed chunk")
                .build(),
        }
    }

    pub fn attempt(&self, provider: &str, outcome: &'static str, seconds: f64) {
        let attributes = [
            KeyValue::new("provider", provider.to_owned()),
            KeyValue::new("outcome", outcome),
        ];
        self.attempts.add(1, &attributes);
        self.attempt_duration.record(seconds, &attributes);
    }

    pub fn circuit_opened(&self, provider: &str) {
        self.circuit_opened.add(1, &[KeyValue::new("provider", provider.to_owned())]);
    }

    pub fn first_chunk(&self, provider: &str, seconds: f64) {
        self.time_to_first_chunk
            .record(seconds, &[KeyValue::new("provider", provider.to_owned())]);
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
