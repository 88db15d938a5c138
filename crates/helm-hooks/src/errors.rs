//! Hook error types.

use thiserror::Error;

/// Errors that can occur during hook execution.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HookError {
    /// The cancellation token fired while a hook was running.
    #[error("hook cancelled: {name}")]
    Cancelled {
        /// Hook that was interrupted.
        name: String,
    },

    /// Hook execution timed out.
    #[error("hook timed out after {timeout_ms}ms: {name}")]
    Timeout {
        /// Hook name that timed out.
        name: String,
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Hook handler returned an error.
    #[error("hook handler error in '{name}': {message}")]
    Handler {
        /// Hook name.
        name: String,
        /// Error message from handler.
        message: String,
    },
}

impl HookError {
    /// Shorthand for [`HookError::Handler`].
    pub fn handler(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
