use std::{sync::Arc, time::Duration};

use reqwest::Client;
use serde_json::Value;
use switchyard_config::Config;
use switchyard_core::RequestContext;
use switchyard_health::HealthTracker;
use switchyard_telemetry::RelayMetrics;

use crate::{
    adapter::{AdapterTable, STREAM_GENERATE, UpstreamCall},
    dialect::Dialect,
    error::RelayError,
    failover::FailoverOrchestrator,
    groups::{GroupResolver, StaticGroups},
    log::{RequestLog, RequestLogContext, UsageLogger},
    pricing::{PriceCatalog, StaticPricing},
    stream::{RelayStream, relay_stream},
};

/// A request as received, before routing
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub dialect: Dialect,
    pub payload: Value,
    /// Gemini `{model}:{action}` path segment
    pub model_action: Option<String>,
}

/// Logical model and Gemini action targeted by a request
struct Target {
    model: String,
    action: Option<String>,
    stream: bool,
}

impl InboundRequest {
    fn target(&self) -> Result<Target, RelayError> {
        if !self.payload.is_object() {
            return Err(RelayError::InvalidRequest("request body must be a JSON object".to_owned()));
        }

        if self.dialect == Dialect::Gemini {
            let model_action = self.model_action.as_deref().unwrap_or_default();
            let Some((model, action)) = model_action.split_once(':') else {
                return Err(RelayError::InvalidRequest(format!(
                    "expected '{{model}}:{{action}}' in path, got '{model_action}'"
                )));
            };

            return Ok(Target {
                model: model.to_owned(),
                action: Some(action.to_owned()),
                stream: action == STREAM_GENERATE,
            });
        }

        let model = self
            .payload
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::InvalidRequest("missing 'model' field".to_owned()))?;

        Ok(Target {
            model: model.to_owned(),
            action: None,
            stream: self.payload.get("stream").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

/// What the caller gets back
pub enum RelayResponse {
    /// Upstream body, passed through
    Json(Value),
    /// Upstream events, passed through
    Stream(RelayStream),
}

/// Shared relay state, cheap to clone into handlers
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    groups: Arc<dyn GroupResolver>,
    pricing: Arc<dyn PriceCatalog>,
    adapters: AdapterTable,
    orchestrator: FailoverOrchestrator,
    logger: UsageLogger,
    client: Client,
    default_timeout: Option<Duration>,
    capture_bodies: bool,
}

impl RelayState {
    /// Build routing, pricing, and the upstream client from config
    pub fn from_config(config: &Config, tracker: Arc<HealthTracker>, logger: UsageLogger) -> anyhow::Result<Self> {
        let groups = StaticGroups::from_config(&config.groups)?;
        let pricing = StaticPricing::new(config.pricing.clone());

        let client = Client::builder()
            .connect_timeout(config.relay.connect_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build upstream client: {e}"))?;

        let default_timeout = config.relay.request_timeout;

        Ok(Self {
            inner: Arc::new(RelayInner {
                groups: Arc::new(groups),
                pricing: Arc::new(pricing),
                adapters: AdapterTable::new(),
                orchestrator: FailoverOrchestrator::new(tracker, default_timeout, RelayMetrics::default()),
                logger,
                client,
                default_timeout,
                capture_bodies: config.usage_log.capture_bodies,
            }),
        })
    }

    /// Route, execute with failover, and log one inbound request
    pub async fn relay(&self, request: InboundRequest, context: RequestContext) -> Result<RelayResponse, RelayError> {
        let inner = &self.inner;
        let target = request.target()?;

        let record = RequestLogContext::new(&context.request_id, request.dialect, &target.model, target.stream);
        let mut log = RequestLog::start(record, inner.logger.clone(), Arc::clone(&inner.pricing), inner.capture_bodies);
        log.capture_request(&request.payload);

        let Some(group) = inner.groups.resolve(&target.model) else {
            let error = RelayError::RoutingNotFound { model: target.model };
            log.fail(&error);
            return Err(error);
        };

        tracing::debug!(
            request_id = %context.request_id,
            dialect = %request.dialect,
            model = %target.model,
            group = %group.name,
            stream = target.stream,
            "dispatching request"
        );

        let adapter = inner.adapters.get(request.dialect);
        let client = &inner.client;
        let call = |candidate| UpstreamCall {
            dialect: request.dialect,
            candidate,
            payload: request.payload.clone(),
            action: target.action.clone(),
            query: context.query.clone(),
            stream: target.stream,
        };

        if target.stream {
            let outcome = inner
                .orchestrator
                .execute_stream(&group, |candidate| adapter.execute_stream(client, call(candidate)))
                .await;

            match outcome {
                Ok(relayed) => {
                    log.served_by(&relayed.candidate, relayed.attempts);
                    let idle_timeout = group.first_token_timeout.or(inner.default_timeout);
                    Ok(RelayResponse::Stream(relay_stream(relayed.value, log, idle_timeout)))
                }
                Err(error) => Err(fail(log, error)),
            }
        } else {
            let outcome = inner
                .orchestrator
                .execute(&group, |candidate| adapter.execute_normal(client, call(candidate)))
                .await;

            match outcome {
                Ok(relayed) => {
                    log.served_by(&relayed.candidate, relayed.attempts);
                    log.observe_body(&relayed.value);
                    log.succeed();
                    Ok(RelayResponse::Json(relayed.value))
                }
                Err(error) => Err(fail(log, error)),
            }
        }
    }
}

fn fail(mut log: RequestLog, error: RelayError) -> RelayError {
    if let RelayError::ProvidersExhausted { attempts, .. } = &error {
        log.set_attempts(*attempts);
    }
    log.fail(&error);
    error
}
