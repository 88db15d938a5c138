//! Scripted provider for deterministic tests without a model backend.
//!
//! Each call to [`Provider::stream`] consumes the next [`MockResponse`]. The
//! provider records every request it receives so tests can assert on what the
//! engine sent (conversation, tool names, tool results).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::provider::{
    Provider, ProviderError, ProviderEvent, ProviderEventStream, ProviderRequest, ProviderResult,
    StopReason,
};

/// Pre-programmed response for one round-trip.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Yield a sequence of events.
    Stream(Vec<ProviderEvent>),
    /// Fail the `stream()` call itself.
    Error(ProviderError),
    /// Wait a duration (cancellable), then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
    /// Never produce anything until cancelled.
    Hang,
}

impl MockResponse {
    /// A plain text reply.
    pub fn text(text: &str) -> Self {
        Self::Stream(vec![
            ProviderEvent::Start,
            ProviderEvent::TextDelta {
                delta: text.to_owned(),
            },
            ProviderEvent::Done {
                stop_reason: StopReason::EndTurn,
                usage: None,
            },
        ])
    }

    /// A reply requesting the given `(id, name, arguments)` tool calls in order.
    pub fn tool_calls(calls: &[(&str, &str, Value)]) -> Self {
        let mut events = vec![ProviderEvent::Start];
        events.extend(calls.iter().map(|(id, name, arguments)| ProviderEvent::ToolCall {
            id: (*id).to_owned(),
            name: (*name).to_owned(),
            arguments: arguments.clone(),
        }));
        events.push(ProviderEvent::Done {
            stop_reason: StopReason::ToolUse,
            usage: None,
        });
        Self::Stream(events)
    }

    /// A stream that ends with an error event.
    pub fn stream_error(cause: Option<&str>) -> Self {
        Self::Stream(vec![
            ProviderEvent::Start,
            ProviderEvent::Error {
                cause: cause.map(str::to_owned),
            },
        ])
    }

    /// Wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Provider that returns pre-programmed responses in sequence.
pub struct ScriptedProvider {
    responses: Vec<MockResponse>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    /// Create a provider that answers calls with `responses` in order.
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of `stream()` calls so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: &ProviderRequest,
    ) -> ProviderResult<ProviderEventStream> {
        self.requests.lock().push(request.clone());
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);

        let Some(response) = self.responses.get(idx) else {
            return Err(ProviderError::Other {
                message: format!("no scripted response for call {idx}"),
            });
        };

        resolve_response(response, cancel).await
    }
}

/// Resolve a response, sleeping through `Delay` layers.
/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_response(
    response: &MockResponse,
    cancel: &CancellationToken,
) -> ProviderResult<ProviderEventStream> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Stream(events) => return Ok(event_stream(events.clone(), cancel.clone())),
            MockResponse::Error(e) => return Err(e.clone()),
            MockResponse::Delay(duration, inner) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    () = tokio::time::sleep(*duration) => current = inner.as_ref(),
                }
            }
            MockResponse::Hang => {
                cancel.cancelled().await;
                return Err(ProviderError::Cancelled);
            }
        }
    }
}

/// Yield `events` in order, stopping with `Cancelled` once the token fires.
pub(crate) fn event_stream(
    events: Vec<ProviderEvent>,
    cancel: CancellationToken,
) -> ProviderEventStream {
    Box::pin(async_stream::stream! {
        for event in events {
            if cancel.is_cancelled() {
                yield Err(ProviderError::Cancelled);
                return;
            }
            yield Ok(event);
        }
    })
}
