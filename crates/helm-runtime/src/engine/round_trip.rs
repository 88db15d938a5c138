//! The tool-calling loop: provider round-trips and sequential tool execution.

use futures::StreamExt;
use helm_core::{Message, MessageId};
use helm_llm::{ProviderError, ProviderEvent, ProviderEventStream, ToolResultEntry};
use helm_tools::ToolContext;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::scope::TurnScope;
use super::{Engine, EngineConfig};
use crate::errors::RuntimeError;

/// What one round-trip produced.
#[derive(Default)]
struct RoundTrip {
    text: String,
    tool_results: Vec<ToolResultEntry>,
}

impl Engine {
    /// Issue round-trips until the provider finishes without calling a tool.
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn tool_loop(
        &self,
        config: &EngineConfig,
        cancel: &CancellationToken,
        run_id: &str,
        message_id: &MessageId,
        messages: &mut Vec<Message>,
        scope: &mut TurnScope<'_>,
        output: &mut String,
    ) -> Result<(), RuntimeError> {
        let mut tool_results = Vec::new();
        for round in 1..=config.max_round_trips {
            if cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            let request = config.build_request(messages, tool_results);
            let stream = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
                opened = self.provider.stream(cancel, &request) => opened?,
            };

            let trip = self
                .consume(config, cancel, run_id, message_id, stream, scope, output)
                .await?;
            if !trip.text.is_empty() {
                messages.push(Message::assistant(trip.text));
            }
            if trip.tool_results.is_empty() {
                debug!(round, "tool loop finished");
                return Ok(());
            }

            messages.extend(trip.tool_results.iter().map(|r| {
                Message::tool_result(r.tool_call_id.as_str(), r.tool_name.as_str(), r.content.as_str())
            }));
            tool_results = trip.tool_results;
        }

        warn!(limit = config.max_round_trips, "round-trip limit reached");
        Err(RuntimeError::MaxRoundTrips(config.max_round_trips))
    }

    #[allow(clippy::too_many_arguments)]
    async fn consume(
        &self,
        config: &EngineConfig,
        cancel: &CancellationToken,
        run_id: &str,
        message_id: &MessageId,
        mut stream: ProviderEventStream,
        scope: &mut TurnScope<'_>,
        output: &mut String,
    ) -> Result<RoundTrip, RuntimeError> {
        let mut trip = RoundTrip::default();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
                next = stream.next() => next,
            };
            let Some(item) = next else {
                return Err(RuntimeError::Provider(ProviderError::Stream {
                    message: "stream ended without a terminal event".to_owned(),
                }));
            };

            match item? {
                ProviderEvent::Start | ProviderEvent::AwaitingNext => {}
                ProviderEvent::TextDelta { delta } => {
                    if delta.is_empty() {
                        continue;
                    }
                    self.runtime.message_update(message_id.as_str(), &delta)?;
                    output.push_str(&delta);
                    trip.text.push_str(&delta);
                }
                ProviderEvent::ToolCall { id, name, arguments } => {
                    let content = self
                        .call_tool(config, cancel, run_id, &id, &name, arguments, scope)
                        .await?;
                    output.push_str(&content);
                    trip.tool_results.push(ToolResultEntry {
                        tool_call_id: id,
                        tool_name: name,
                        content,
                    });
                }
                ProviderEvent::Warning { code, message } => {
                    warn!(%code, %message, "provider warning");
                    self.runtime.warning(&code, &message);
                }
                ProviderEvent::Error { cause } => {
                    let message = cause
                        .filter(|c| !c.is_empty())
                        .unwrap_or_else(|| "provider_error".to_owned());
                    return Err(RuntimeError::Provider(ProviderError::Other { message }));
                }
                ProviderEvent::Done { stop_reason, usage } => {
                    debug!(?stop_reason, ?usage, tool_calls = trip.tool_results.len(), "round-trip done");
                    return Ok(trip);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn call_tool(
        &self,
        config: &EngineConfig,
        cancel: &CancellationToken,
        run_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        args: Value,
        scope: &mut TurnScope<'_>,
    ) -> Result<String, RuntimeError> {
        let decision = config.hooks.run_tool_call(cancel, tool_name, &args).await?;
        if decision.blocked {
            return Err(RuntimeError::Blocked {
                tool_name: tool_name.to_owned(),
                reason: decision
                    .reason
                    .unwrap_or_else(|| helm_hooks::DEFAULT_BLOCK_REASON.to_owned()),
            });
        }

        let Some(tool) = config.tools.get(tool_name) else {
            warn!(tool_name, "tool not found");
            self.runtime
                .warning("tool_not_found", &format!("tool not found: {tool_name}"));
            return Err(RuntimeError::ToolNotFound {
                tool_name: tool_name.to_owned(),
            });
        };

        scope.open_tool(tool_call_id, tool_name)?;
        let ctx = ToolContext {
            tool_call_id: tool_call_id.to_owned(),
            run_id: run_id.to_owned(),
            cancellation: cancel.clone(),
        };
        let raw = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            result = tool.execute(args, &ctx) => result,
        };
        let raw = raw.map_err(|e| RuntimeError::from_tool(tool_name, e))?;
        if !raw.is_empty() {
            self.runtime
                .tool_execution_update(tool_call_id, tool_name, &raw)?;
        }
        scope.close_tool()?;
        debug!(tool_name, tool_call_id, "tool executed");

        Ok(config.hooks.run_tool_result(cancel, tool_name, raw).await?)
    }
}
