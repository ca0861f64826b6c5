//! Per-request usage records and their asynchronous sink
//!
//! A [`RequestLog`] is created when a request is dispatched and filled in as
//! the response is consumed. It is submitted exactly once: explicitly on
//! success or error, or from `Drop` as cancelled when the caller goes away
//! mid-stream. Submission is a channel send, so sink I/O never touches the
//! response path.

use std::{
    path::Path,
    sync::Arc,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use serde_json::Value;
use switchyard_config::{UsageLogConfig, UsageLogSink};
use switchyard_health::ProviderId;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
};

use crate::{
    dialect::Dialect,
    error::{AttemptError, ErrorStage, RelayError},
    groups::RoutingCandidate,
    pricing::{Cost, PriceCatalog},
    usage::Usage,
};

/// Final outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    Success,
    Fail,
    /// Caller disconnected before the response completed
    Cancelled,
}

/// Everything recorded about one inbound request
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogContext {
    pub id: String,
    pub request_id: String,
    /// Unix milliseconds at dispatch
    pub request_time: u64,
    pub request_type: Dialect,
    /// Model name as requested by the caller
    pub request_model: String,
    /// Model name sent to the chosen upstream
    pub upstream_model: Option<String>,
    /// Model name reported back by the upstream
    pub actual_model: Option<String>,
    pub provider_id: Option<ProviderId>,
    pub provider_name: Option<String>,
    pub stream: bool,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub first_token_ms: Option<u64>,
    pub total_time_ms: u64,
    pub cost: Option<Cost>,
    pub status: LogStatus,
    pub error_stage: Option<ErrorStage>,
    pub error_message: Option<String>,
    /// Attempts beyond the first
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content: Option<String>,
}

impl RequestLogContext {
    pub fn new(request_id: &str, dialect: Dialect, request_model: &str, stream: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.to_owned(),
            request_time: unix_ms(),
            request_type: dialect,
            request_model: request_model.to_owned(),
            upstream_model: None,
            actual_model: None,
            provider_id: None,
            provider_name: None,
            stream,
            input_tokens: None,
            output_tokens: None,
            first_token_ms: None,
            total_time_ms: 0,
            cost: None,
            status: LogStatus::Fail,
            error_stage: None,
            error_message: None,
            retry_count: 0,
            request_content: None,
            response_content: None,
        }
    }
}

/// A request record being filled in, submitted once when finished or dropped
pub struct RequestLog {
    record: Option<RequestLogContext>,
    usage: Usage,
    logger: UsageLogger,
    pricing: Arc<dyn PriceCatalog>,
    started: Instant,
    capture_bodies: bool,
}

impl RequestLog {
    pub fn start(
        record: RequestLogContext,
        logger: UsageLogger,
        pricing: Arc<dyn PriceCatalog>,
        capture_bodies: bool,
    ) -> Self {
        Self {
            record: Some(record),
            usage: Usage::default(),
            logger,
            pricing,
            started: Instant::now(),
            capture_bodies,
        }
    }

    pub fn capture_request(&mut self, payload: &Value) {
        if !self.capture_bodies {
            return;
        }
        if let Some(record) = &mut self.record {
            record.request_content = Some(payload.to_string());
        }
    }

    /// Note the candidate that served the request and how many attempts it took
    pub fn served_by(&mut self, candidate: &RoutingCandidate, attempts: u32) {
        if let Some(record) = &mut self.record {
            record.provider_id = Some(candidate.provider_id.clone());
            record.provider_name = Some(candidate.provider_name.clone());
            record.upstream_model = Some(candidate.model.clone());
            record.retry_count = attempts.saturating_sub(1);
        }
    }

    pub fn set_attempts(&mut self, attempts: u32) {
        if let Some(record) = &mut self.record {
            record.retry_count = attempts.saturating_sub(1);
        }
    }

    /// Fold a buffered response body into the record
    pub fn observe_body(&mut self, body: &Value) {
        self.usage.observe(body);
        if self.capture_bodies
            && let Some(record) = &mut self.record
        {
            record.response_content = Some(body.to_string());
        }
    }

    /// Fold one streamed chunk into the record
    pub fn observe_chunk(&mut self, data: &str) {
        self.usage.observe_chunk(data);

        if let Some(record) = &mut self.record {
            if record.first_token_ms.is_none() {
                record.first_token_ms = Some(elapsed_ms(self.started));
            }
            if self.capture_bodies {
                let content = record.response_content.get_or_insert_with(String::new);
                content.push_str(data);
                content.push('\n');
            }
        }
    }

    pub fn succeed(mut self) {
        self.finish(LogStatus::Success, None);
    }

    pub fn fail(mut self, error: &RelayError) {
        self.finish(LogStatus::Fail, Some((error.stage(), error.to_string())));
    }

    /// Failure after output reached the caller, keeping the attempt's stage
    pub fn fail_mid_stream(mut self, error: &AttemptError) {
        self.finish(LogStatus::Fail, Some((error.stage(), error.to_string())));
    }

    fn finish(&mut self, status: LogStatus, error: Option<(ErrorStage, String)>) {
        let Some(mut record) = self.record.take() else {
            return;
        };

        record.status = status;
        record.total_time_ms = elapsed_ms(self.started);
        record.actual_model = self.usage.actual_model.clone();
        record.input_tokens = self.usage.input_tokens;
        record.output_tokens = self.usage.output_tokens;
        if let Some((stage, message)) = error {
            record.error_stage = Some(stage);
            record.error_message = Some(message);
        }

        if record.provider_id.is_some() {
            record.cost = Some(self.cost(&record));
        }

        self.logger.submit(record);
    }

    fn cost(&self, record: &RequestLogContext) -> Cost {
        let price = [record.actual_model.as_deref(), record.upstream_model.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|model| self.pricing.price_of(model));

        let input = record.input_tokens.unwrap_or(0);
        let output = record.output_tokens.unwrap_or(0);

        match price {
            Some(price) => Cost::compute(&price, input, output),
            None => {
                tracing::warn!(
                    model = record.actual_model.as_deref().or(record.upstream_model.as_deref()),
                    "no price configured for model, recording zero cost"
                );
                Cost::ZERO
            }
        }
    }
}

impl Drop for RequestLog {
    fn drop(&mut self) {
        if self.record.is_some() {
            self.finish(LogStatus::Cancelled, None);
        }
    }
}

/// Fire-and-forget sink for request records
#[derive(Clone)]
pub struct UsageLogger {
    tx: mpsc::UnboundedSender<RequestLogContext>,
}

enum Sink {
    Tracing,
    Jsonl(BufWriter<File>),
}

impl UsageLogger {
    /// Open the configured sink and spawn its background writer
    ///
    /// The writer runs until every logger clone is dropped
    pub async fn spawn(config: &UsageLogConfig) -> anyhow::Result<Self> {
        let sink = match config.sink {
            UsageLogSink::Tracing => Sink::Tracing,
            UsageLogSink::Jsonl => {
                let path = config
                    .path
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("the jsonl usage log sink requires a path"))?;
                Sink::Jsonl(BufWriter::new(open_append(path).await?))
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(process_records(rx, sink));

        Ok(Self { tx })
    }

    /// Logger paired with a receiver, for inspecting records directly
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RequestLogContext>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a record, never blocks
    pub fn submit(&self, record: RequestLogContext) {
        if let Err(e) = self.tx.send(record) {
            tracing::warn!(error = %e, "failed to enqueue request log, channel closed");
        }
    }
}

impl std::fmt::Debug for UsageLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageLogger").finish_non_exhaustive()
    }
}

async fn open_append(path: &Path) -> anyhow::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to open usage log {}: {e}", path.display()))
}

async fn process_records(mut rx: mpsc::UnboundedReceiver<RequestLogContext>, mut sink: Sink) {
    while let Some(record) = rx.recv().await {
        match &mut sink {
            Sink::Tracing => emit(&record),
            Sink::Jsonl(writer) => {
                if let Err(e) = append_line(writer, &record).await {
                    tracing::error!(error = %e, request_id = %record.request_id, "failed to write request log");
                }
            }
        }
    }

    tracing::debug!("usage logger shutting down");
}

fn emit(record: &RequestLogContext) {
    let cost = record.cost.map(|c| c.total.to_string());
    let error_stage = record.error_stage.map(|s| s.to_string());

    tracing::info!(
        target: "switchyard::usage",
        request_id = %record.request_id,
        request_type = %record.request_type,
        request_model = %record.request_model,
        upstream_model = record.upstream_model.as_deref(),
        actual_model = record.actual_model.as_deref(),
        provider = record.provider_name.as_deref(),
        stream = record.stream,
        input_tokens = record.input_tokens,
        output_tokens = record.output_tokens,
        first_token_ms = record.first_token_ms,
        total_time_ms = record.total_time_ms,
        cost = cost.as_deref(),
        status = %record.status,
        error_stage = error_stage.as_deref(),
        error = record.error_message.as_deref(),
        retry_count = record.retry_count,
        "request completed"
    );
}

async fn append_line(writer: &mut BufWriter<File>, record: &RequestLogContext) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indexmap::IndexMap;
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use serde_json::json;
    use switchyard_config::ModelPrice;
    use url::Url;

    use super::*;
    use crate::pricing::StaticPricing;

    fn pricing() -> Arc<dyn PriceCatalog> {
        let mut prices = IndexMap::new();
        prices.insert(
            "gpt-4o".to_owned(),
            ModelPrice {
                input: Decimal::from(3),
                output: Decimal::from(15),
            },
        );
        Arc::new(StaticPricing::new(prices))
    }

    fn candidate() -> RoutingCandidate {
        RoutingCandidate {
            provider_id: ProviderId::from("p1"),
            provider_name: "primary".to_owned(),
            base_url: Url::parse("http://localhost/v1").unwrap(),
            api_key: SecretString::from("sk"),
            model: "gpt-4o".to_owned(),
            weight: 1,
        }
    }

    fn start(capture: bool) -> (RequestLog, mpsc::UnboundedReceiver<RequestLogContext>) {
        let (logger, rx) = UsageLogger::channel();
        let record = RequestLogContext::new("req-1", Dialect::OpenAiChat, "gpt-4", true);
        (RequestLog::start(record, logger, pricing(), capture), rx)
    }

    #[test]
    fn success_record_carries_usage_and_cost() {
        let (mut log, mut rx) = start(false);
        log.served_by(&candidate(), 2);
        log.observe_body(&json!({
            "model": "gpt-4o",
            "usage": { "prompt_tokens": 1000, "completion_tokens": 500 }
        }));
        log.succeed();

        let record = rx.try_recv().unwrap();
        assert_eq!(record.status, LogStatus::Success);
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.input_tokens, Some(1000));
        assert_eq!(record.output_tokens, Some(500));
        assert_eq!(record.cost.unwrap().total, Decimal::from_str("0.0105").unwrap());
        assert!(record.response_content.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_log_is_cancelled_once() {
        let (mut log, mut rx) = start(true);
        log.served_by(&candidate(), 1);
        log.observe_chunk(r#"{"model":"gpt-4o","choices":[]}"#);
        drop(log);

        let record = rx.try_recv().unwrap();
        assert_eq!(record.status, LogStatus::Cancelled);
        assert!(record.first_token_ms.is_some());
        assert!(record.response_content.unwrap().contains("choices"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn failure_records_stage_without_cost() {
        let (log, mut rx) = start(false);
        log.fail(&RelayError::ProvidersExhausted {
            group: "gpt-4".to_owned(),
            attempts: 0,
            last_error: None,
        });

        let record = rx.try_recv().unwrap();
        assert_eq!(record.status, LogStatus::Fail);
        assert_eq!(record.error_stage, Some(ErrorStage::Selection));
        assert!(record.cost.is_none());
    }

    #[test]
    fn unknown_model_costs_zero() {
        let (mut log, mut rx) = start(false);
        let mut other = candidate();
        other.model = "mystery".to_owned();
        log.served_by(&other, 1);
        log.observe_body(&json!({ "usage": { "input_tokens": 10, "output_tokens": 10 } }));
        log.succeed();

        assert_eq!(rx.try_recv().unwrap().cost.unwrap().total, Decimal::ZERO);
    }

    #[test]
    fn status_serializes_screaming() {
        assert_eq!(serde_json::to_value(LogStatus::Cancelled).unwrap(), json!("CANCELLED"));
    }

    #[tokio::test]
    async fn jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.jsonl");
        let config = UsageLogConfig {
            sink: UsageLogSink::Jsonl,
            path: Some(path.clone()),
            capture_bodies: false,
        };

        let logger = UsageLogger::spawn(&config).await.unwrap();
        logger.submit(RequestLogContext::new("a", Dialect::Gemini, "gemini", false));
        logger.submit(RequestLogContext::new("b", Dialect::Gemini, "gemini", false));

        let mut lines = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let raw = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            lines = raw.lines().map(str::to_owned).collect();
            if lines.len() == 2 {
                break;
            }
        }

        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["request_id"], "a");
        assert_eq!(first["request_type"], "gemini_models");
    }
}
