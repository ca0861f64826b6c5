//! Multi-dialect LLM relay
//!
//! Resolves an inbound request to a routing group, executes it against the
//! group's providers with health-aware failover, and streams or returns the
//! upstream response unchanged while recording usage.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod adapter;
mod dialect;
mod dispatcher;
mod error;
mod failover;
mod groups;
mod handler;
mod log;
mod pricing;
mod stream;
mod usage;

pub use adapter::{Adapter, AdapterTable, ChunkStream, UpstreamCall};
pub use dialect::Dialect;
pub use dispatcher::{InboundRequest, RelayResponse, RelayState};
pub use error::{AttemptError, ErrorStage, RelayError};
pub use failover::{AttemptRecorder, FailoverOrchestrator, PrimedStream, Relayed};
pub use groups::{GroupResolver, RoutingCandidate, RoutingGroup, StaticGroups};
pub use handler::relay_router;
pub use log::{LogStatus, RequestLog, RequestLogContext, UsageLogger};
pub use pricing::{Cost, PriceCatalog, StaticPricing};
pub use stream::{RelayStream, relay_stream};
pub use usage::Usage;
