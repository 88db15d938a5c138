//! Lifecycle event model.
//!
//! Every observable step of a run is reported as an [`Event`]. Events are
//! immutable once built; the runtime fills in the run id, turn counter and
//! timestamp, and the emitting call adds the scope-specific fields (message
//! id and role, delta text, tool call id and name, warning code).
//!
//! Start/end pairs (`agent_*`, `turn_*`, `message_*`, `tool_execution_*`)
//! nest for a given run id. `status`, `warning` and `error` are point events
//! that can appear anywhere.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::messages::Role;

/// Fixed set of lifecycle event types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A run started.
    AgentStart,
    /// A run ended.
    AgentEnd,
    /// A turn started inside the current run.
    TurnStart,
    /// The current turn ended.
    TurnEnd,
    /// A message was opened.
    MessageStart,
    /// Streaming delta for an open message.
    MessageUpdate,
    /// A message was closed.
    MessageEnd,
    /// A tool call began executing.
    ToolExecutionStart,
    /// Progress from an executing tool call.
    ToolExecutionUpdate,
    /// A tool call finished executing.
    ToolExecutionEnd,
    /// Informational status.
    Status,
    /// Non-fatal problem.
    Warning,
    /// Fatal problem for the current turn.
    Error,
}

impl EventType {
    /// Wire name of the event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentStart => "agent_start",
            Self::AgentEnd => "agent_end",
            Self::TurnStart => "turn_start",
            Self::TurnEnd => "turn_end",
            Self::MessageStart => "message_start",
            Self::MessageUpdate => "message_update",
            Self::MessageEnd => "message_end",
            Self::ToolExecutionStart => "tool_execution_start",
            Self::ToolExecutionUpdate => "tool_execution_update",
            Self::ToolExecutionEnd => "tool_execution_end",
            Self::Status => "status",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Whether this event type is a point event outside the nesting scopes.
    #[must_use]
    pub const fn is_point(self) -> bool {
        matches!(self, Self::Status | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable lifecycle notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Run this event belongs to (empty for point events emitted while idle).
    pub run_id: String,
    /// Turn counter at emission time.
    pub turn: u32,
    /// Message id for `message_*` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Message role, set on `message_start`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Delta text for update events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    /// Tool call id for `tool_execution_*` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name for `tool_execution_*` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Machine-readable code for status/warning/error events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable text for status/warning/error events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

impl Event {
    /// Create an event stamped with the current UTC time.
    #[must_use]
    pub fn now(event_type: EventType, run_id: impl Into<String>, turn: u32) -> Self {
        Self {
            event_type,
            run_id: run_id.into(),
            turn,
            message_id: None,
            role: None,
            delta: None,
            tool_call_id: None,
            tool_name: None,
            code: None,
            message: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Attach a message id and optional role.
    #[must_use]
    pub fn with_message(mut self, message_id: impl Into<String>, role: Option<Role>) -> Self {
        self.message_id = Some(message_id.into());
        self.role = role;
        self
    }

    /// Attach delta text. Empty deltas are dropped.
    #[must_use]
    pub fn with_delta(mut self, delta: &str) -> Self {
        if !delta.is_empty() {
            self.delta = Some(delta.to_owned());
        }
        self
    }

    /// Attach a tool call id and tool name.
    #[must_use]
    pub fn with_tool(mut self, tool_call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Attach a code and text (status/warning/error).
    #[must_use]
    pub fn with_notice(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self.message = Some(message.into());
        self
    }

    /// Wire name of the event type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.event_type.as_str()
    }
}
