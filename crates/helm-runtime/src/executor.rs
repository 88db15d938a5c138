//! Capabilities the command loop depends on.
//!
//! The loop only needs something that can execute a turn
//! ([`TurnExecutor`]). An executor that also wants to bracket whole runs
//! exposes [`RunCoordinator`] through
//! [`TurnExecutor::as_run_coordinator`]; the loop asks for it explicitly
//! instead of guessing from the concrete type.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::RuntimeError;

/// Outcome of one turn: final text plus an optional error.
///
/// On failure `output` keeps whatever had already streamed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Final (or partial) output text.
    pub output: String,
    /// Why the turn failed, if it did.
    pub error: Option<RuntimeError>,
}

impl ExecutionResult {
    /// A successful result.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    /// A failed result with partial output.
    pub fn failed(output: impl Into<String>, error: RuntimeError) -> Self {
        Self {
            output: output.into(),
            error: Some(error),
        }
    }

    /// Whether the turn succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Executes one turn of a run.
#[async_trait]
pub trait TurnExecutor: Send + Sync {
    /// Run one turn for `run_id` with `text` as input.
    ///
    /// Must observe `cancel` and return promptly with a cancellation error
    /// once it fires.
    async fn execute(&self, cancel: &CancellationToken, run_id: &str, text: &str) -> ExecutionResult;

    /// Optional run-lifecycle capability.
    fn as_run_coordinator(&self) -> Option<&dyn RunCoordinator> {
        None
    }
}

/// Brackets every turn of a run with one begin and one end call.
#[async_trait]
pub trait RunCoordinator: Send + Sync {
    /// Called once before the first turn of `run_id`.
    async fn begin_run(&self, cancel: &CancellationToken, run_id: &str) -> Result<(), RuntimeError>;

    /// Called once after the final turn of `run_id`, including aborted runs.
    async fn end_run(&self, run_id: &str) -> Result<(), RuntimeError>;
}
