//! Core tool trait and per-call context.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::ToolError;

/// Execution context passed to every tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Unique ID of this tool call.
    pub tool_call_id: String,
    /// Run the call belongs to.
    pub run_id: String,
    /// Cancellation token for cooperative cancellation.
    pub cancellation: CancellationToken,
}

/// The trait every tool implements.
///
/// Tools are identified by [`name`](Tool::name), unique within the active
/// tool set. Long-running tools must watch `ctx.cancellation` and return
/// [`ToolError::Cancelled`] promptly once it fires.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, the exact string the provider uses to call it.
    fn name(&self) -> &str;

    /// Short human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Execute the tool with JSON arguments, returning result text.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError>;
}
