//! Tool error types.

use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ToolError {
    /// Argument validation failed.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Tool-specific failure.
    #[error("{message}")]
    Failed {
        /// Failure description.
        message: String,
    },
}

impl ToolError {
    /// Shorthand for [`ToolError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Whether this error reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
