//! Proxied SSE stream with usage capture and end-of-stream accounting
//!
//! Events pass through unchanged. When the upstream ends cleanly the
//! attempt is recorded as a success; when it breaks, the failure is
//! recorded, surfaced to the caller once as [`RelayError::MidStream`], and
//! the stream ends. If the caller disconnects first, the state is dropped
//! along with the upstream response: the request is logged as cancelled and
//! provider health is left alone.

use std::time::Duration;

use eventsource_stream::Event;
use futures_util::{
    StreamExt,
    stream::{self, BoxStream},
};

use crate::{
    adapter::ChunkStream,
    error::{AttemptError, RelayError},
    failover::{AttemptRecorder, PrimedStream},
    log::RequestLog,
};

/// Stream handed to the HTTP layer
pub type RelayStream = BoxStream<'static, Result<Event, RelayError>>;

struct Relay {
    first: Option<Event>,
    rest: ChunkStream,
    recorder: Option<AttemptRecorder>,
    log: Option<RequestLog>,
    idle_timeout: Option<Duration>,
    finished: bool,
}

impl Relay {
    fn observe(&mut self, event: &Event) {
        if let Some(log) = &mut self.log {
            log.observe_chunk(&event.data);
        }
    }

    async fn next_upstream(&mut self) -> Option<Result<Event, AttemptError>> {
        let Some(limit) = self.idle_timeout else {
            return self.rest.next().await;
        };

        tokio::time::timeout(limit, self.rest.next()).await.unwrap_or_else(|_| {
            Some(Err(AttemptError::Timeout {
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                mid_stream: true,
            }))
        })
    }

    fn complete(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            recorder.success();
        }
        if let Some(log) = self.log.take() {
            log.succeed();
        }
    }

    fn break_off(&mut self, error: AttemptError) -> RelayError {
        let error = error.into_mid_stream();

        if let Some(recorder) = self.recorder.take() {
            recorder.failure(&error);
        }
        if let Some(log) = self.log.take() {
            log.fail_mid_stream(&error);
        }

        self.finished = true;
        RelayError::MidStream(error.to_string())
    }
}

/// Relay a primed upstream stream to the caller
///
/// `idle_timeout` bounds each wait for the next upstream event.
pub fn relay_stream(primed: PrimedStream, log: RequestLog, idle_timeout: Option<Duration>) -> RelayStream {
    let relay = Relay {
        first: Some(primed.first),
        rest: primed.rest,
        recorder: Some(primed.recorder),
        log: Some(log),
        idle_timeout,
        finished: false,
    };

    stream::unfold(relay, |mut relay| async move {
        if relay.finished {
            return None;
        }

        if let Some(first) = relay.first.take() {
            relay.observe(&first);
            return Some((Ok(first), relay));
        }

        match relay.next_upstream().await {
            Some(Ok(event)) => {
                relay.observe(&event);
                Some((Ok(event), relay))
            }
            Some(Err(error)) => {
                let error = relay.break_off(error);
                Some((Err(error), relay))
            }
            None => {
                relay.complete();
                None
            }
        }
    })
    .boxed()
}
