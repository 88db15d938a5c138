//! Runtime error types.
//!
//! - [`LifecycleError`]: rejected [`Runtime`](crate::lifecycle::Runtime) transitions
//! - [`RuntimeError`]: why a turn failed, with a stable [`category`](RuntimeError::category)
//! - [`CommandError`]: synchronous rejections from the command loop, with the
//!   caller-facing [`code`](CommandError::code)

use helm_core::ParseQueueModeError;
use helm_hooks::HookError;
use helm_llm::ProviderError;
use helm_tools::ToolError;

use crate::lifecycle::RunState;

/// A transition the lifecycle state machine refused.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The operation is not allowed from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// State the runtime was in.
        from: RunState,
        /// Target state or operation that was attempted.
        to: &'static str,
    },

    /// `start_run` was called with an empty id.
    #[error("run id must not be empty")]
    EmptyRunId,

    /// `end_turn` was called before any turn started.
    #[error("no turn has started in this run")]
    NoTurn,

    /// A message operation was called with an empty id.
    #[error("message id must not be empty")]
    EmptyMessageId,

    /// A tool operation was called with an empty id or name.
    #[error("tool call id and tool name must not be empty")]
    EmptyToolCall,
}

/// Errors that can fail a turn.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// A lifecycle transition was rejected.
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// A hook returned an error or timed out.
    #[error("{0}")]
    Hook(HookError),

    /// A tool-call hook rejected the call.
    #[error("tool call '{tool_name}' blocked: {reason}")]
    Blocked {
        /// Tool that was rejected.
        tool_name: String,
        /// Reason given by the hook.
        reason: String,
    },

    /// The provider asked for a tool outside the active set.
    #[error("tool not found: {tool_name}")]
    ToolNotFound {
        /// Requested tool name.
        tool_name: String,
    },

    /// Tool execution failed.
    #[error("tool error: {tool_name}: {message}")]
    Tool {
        /// Tool name.
        tool_name: String,
        /// Error description.
        message: String,
    },

    /// Provider failed to open or stream a round-trip.
    #[error("provider error: {0}")]
    Provider(ProviderError),

    /// Operation was cancelled via abort.
    #[error("operation cancelled")]
    Cancelled,

    /// The tool-calling loop exceeded its round-trip limit.
    #[error("max round trips ({0}) exceeded")]
    MaxRoundTrips(u32),

    /// Run coordination (begin/end run) failed.
    #[error("run coordination failed: {0}")]
    Coordination(String),

    /// Internal / unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<HookError> for RuntimeError {
    fn from(e: HookError) -> Self {
        if e.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Hook(e)
        }
    }
}

impl From<ProviderError> for RuntimeError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Cancelled => Self::Cancelled,
            other => Self::Provider(other),
        }
    }
}

impl RuntimeError {
    /// Map a tool failure, folding cancellation into [`RuntimeError::Cancelled`].
    pub fn from_tool(tool_name: &str, e: ToolError) -> Self {
        if e.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Tool {
                tool_name: tool_name.to_owned(),
                message: e.to_string(),
            }
        }
    }

    /// Error category string for event emission.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Lifecycle(_) => "lifecycle",
            Self::Hook(_) => "hook",
            Self::Blocked { .. } => "blocked_by_extension",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::Tool { .. } => "tool",
            Self::Provider(_) => "provider_error",
            Self::Cancelled => "cancelled",
            Self::MaxRoundTrips(_) => "max_round_trips",
            Self::Coordination(_) => "coordination",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether this error reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Synchronous rejections from the command loop.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Prompt text was blank.
    #[error("prompt text is empty")]
    EmptyPrompt,
    /// Steer text was blank.
    #[error("steer text is empty")]
    EmptySteer,
    /// Follow-up text was blank.
    #[error("follow-up text is empty")]
    EmptyFollowUp,
    /// A run is already active.
    #[error("a run is already in progress")]
    RunInProgress,
    /// The operation needs an active run.
    #[error("no active run")]
    NoActiveRun,
    /// No Tokio runtime is available to run the loop on.
    #[error("no tokio runtime available to run the command loop")]
    NoRuntime,
    /// Unknown queue mode name.
    #[error(transparent)]
    InvalidQueueMode(#[from] ParseQueueModeError),
}

impl CommandError {
    /// Stable code for transport layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "empty_prompt",
            Self::EmptySteer => "empty_steer",
            Self::EmptyFollowUp => "empty_follow_up",
            Self::RunInProgress => "run_in_progress",
            Self::NoActiveRun => "no_active_run",
            Self::NoRuntime => "no_runtime",
            Self::InvalidQueueMode(_) => "invalid_queue_mode",
        }
    }
}
