//! # Provider Trait
//!
//! Core abstraction for model backends. The engine calls
//! [`Provider::stream`] once per round-trip and consumes the returned
//! [`ProviderEventStream`] until a terminal event (`Done` or `Error`).
//!
//! Providers must observe the cancellation token both while opening the
//! stream and while yielding events, and surface [`ProviderError::Cancelled`]
//! promptly.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use helm_core::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Boxed stream of [`ProviderEvent`]s returned by [`Provider::stream`].
pub type ProviderEventStream =
    Pin<Box<dyn Stream<Item = Result<ProviderEvent, ProviderError>> + Send>>;

/// Errors that can occur during provider operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Stream was cancelled.
    #[error("stream cancelled")]
    Cancelled,

    /// The stream failed or ended without a terminal event.
    #[error("stream error: {message}")]
    Stream {
        /// Error description.
        message: String,
    },

    /// Provider-specific error.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

/// Why the provider stopped producing output for a round-trip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the reply.
    #[default]
    EndTurn,
    /// The reply requested one or more tool calls.
    ToolUse,
    /// Output limit reached.
    MaxTokens,
    /// A stop sequence matched.
    StopSequence,
}

/// Token accounting reported with `Done`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Completion tokens produced.
    pub output_tokens: u64,
}

/// One event of a provider round-trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// The round-trip started.
    Start,
    /// Streamed assistant text.
    TextDelta {
        /// Text fragment.
        delta: String,
    },
    /// The model requested a tool call.
    ToolCall {
        /// Provider-assigned call id.
        id: String,
        /// Tool name.
        name: String,
        /// JSON arguments.
        arguments: Value,
    },
    /// The provider expects another round-trip after tool results.
    AwaitingNext,
    /// Non-fatal provider notice.
    Warning {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// Terminal failure.
    Error {
        /// Error description, if the provider attached one.
        cause: Option<String>,
    },
    /// Terminal success.
    Done {
        /// Why output stopped.
        stop_reason: StopReason,
        /// Token usage, if reported.
        usage: Option<TokenUsage>,
    },
}

/// A conversation entry in provider wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMessage {
    /// Entry role.
    pub role: Role,
    /// Entry content.
    pub content: String,
    /// Tool call answered by this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Result of a tool call fed back on the next round-trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultEntry {
    /// Call id the result answers.
    pub tool_call_id: String,
    /// Tool that produced it.
    pub tool_name: String,
    /// Result text after tool-result hooks.
    pub content: String,
}

/// Request for one provider round-trip.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest {
    /// Conversation so far, already converted to provider format.
    pub messages: Vec<ProviderMessage>,
    /// Names of the tools the model may call.
    pub tool_names: Vec<String>,
    /// Results of the tool calls made in the previous round-trip.
    pub tool_results: Vec<ToolResultEntry>,
}

impl ProviderRequest {
    /// Text of the most recent user message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Core model provider trait.
///
/// Implementors must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier.
    fn name(&self) -> &str;

    /// Open one streaming round-trip.
    ///
    /// The caller consumes events until [`ProviderEvent::Done`] or
    /// [`ProviderEvent::Error`] is received.
    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: &ProviderRequest,
    ) -> ProviderResult<ProviderEventStream>;
}
