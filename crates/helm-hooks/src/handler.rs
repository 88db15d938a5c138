//! Hook traits and their result types.
//!
//! Each category has its own trait so a handler can only be registered where
//! its signature makes sense. The `*_fn` helpers wrap plain closures for
//! callers that do not need a dedicated type.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::HookError;

/// Result of an input hook.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputOutcome {
    /// Replacement text. Empty keeps the current text.
    pub text: String,
    /// Stop the chain here; later hooks are not invoked.
    pub handled: bool,
}

impl InputOutcome {
    /// Keep the text and continue the chain.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Replace the text and continue the chain.
    pub fn rewrite(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            handled: false,
        }
    }

    /// Replace the text and stop the chain.
    pub fn handled(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            handled: true,
        }
    }
}

/// Result of a tool-call hook.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCallDecision {
    /// Reject the call.
    pub blocked: bool,
    /// Why the call was rejected.
    pub reason: Option<String>,
}

impl ToolCallDecision {
    /// Let the call through.
    pub fn allow() -> Self {
        Self::default()
    }

    /// Reject the call with a reason.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
        }
    }
}

/// Rewrites or claims the prompt text before a turn runs.
#[async_trait]
pub trait InputHook: Send + Sync {
    /// Hook name used in logs and errors.
    fn name(&self) -> &str;

    /// Inspect the current prompt text.
    async fn on_input(&self, text: &str) -> Result<InputOutcome, HookError>;
}

/// Approves or rejects a tool call before it executes.
#[async_trait]
pub trait ToolCallHook: Send + Sync {
    /// Hook name used in logs and errors.
    fn name(&self) -> &str;

    /// Inspect a pending tool call.
    async fn on_tool_call(&self, tool_name: &str, args: &Value)
    -> Result<ToolCallDecision, HookError>;
}

/// Rewrites a tool result before it is recorded.
#[async_trait]
pub trait ToolResultHook: Send + Sync {
    /// Hook name used in logs and errors.
    fn name(&self) -> &str;

    /// Return replacement text, or an empty string to keep `result`.
    async fn on_tool_result(&self, tool_name: &str, result: &str) -> Result<String, HookError>;
}

/// Observes the end of a completed turn.
#[async_trait]
pub trait TurnEndHook: Send + Sync {
    /// Hook name used in logs and errors.
    fn name(&self) -> &str;

    /// Called once after the turn's assistant message closes.
    async fn on_turn_end(&self, run_id: &str, turn: u32) -> Result<(), HookError>;
}

/// Observes the start or end of a run.
#[async_trait]
pub trait RunHook: Send + Sync {
    /// Hook name used in logs and errors.
    fn name(&self) -> &str;

    /// Called once per run.
    async fn on_run(&self, run_id: &str) -> Result<(), HookError>;
}

struct FnHook<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> InputHook for FnHook<F>
where
    F: Fn(&str) -> Result<InputOutcome, HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_input(&self, text: &str) -> Result<InputOutcome, HookError> {
        (self.f)(text)
    }
}

struct ToolCallFn<F>(FnHook<F>);

#[async_trait]
impl<F> ToolCallHook for ToolCallFn<F>
where
    F: Fn(&str, &Value) -> Result<ToolCallDecision, HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.0.name
    }

    async fn on_tool_call(
        &self,
        tool_name: &str,
        args: &Value,
    ) -> Result<ToolCallDecision, HookError> {
        (self.0.f)(tool_name, args)
    }
}

struct ToolResultFn<F>(FnHook<F>);

#[async_trait]
impl<F> ToolResultHook for ToolResultFn<F>
where
    F: Fn(&str, &str) -> Result<String, HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.0.name
    }

    async fn on_tool_result(&self, tool_name: &str, result: &str) -> Result<String, HookError> {
        (self.0.f)(tool_name, result)
    }
}

struct TurnEndFn<F>(FnHook<F>);

#[async_trait]
impl<F> TurnEndHook for TurnEndFn<F>
where
    F: Fn(&str, u32) -> Result<(), HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.0.name
    }

    async fn on_turn_end(&self, run_id: &str, turn: u32) -> Result<(), HookError> {
        (self.0.f)(run_id, turn)
    }
}

struct RunFn<F>(FnHook<F>);

#[async_trait]
impl<F> RunHook for RunFn<F>
where
    F: Fn(&str) -> Result<(), HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.0.name
    }

    async fn on_run(&self, run_id: &str) -> Result<(), HookError> {
        (self.0.f)(run_id)
    }
}

/// Wrap a closure as an [`InputHook`].
pub fn input_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn InputHook>
where
    F: Fn(&str) -> Result<InputOutcome, HookError> + Send + Sync + 'static,
{
    Arc::new(FnHook {
        name: name.into(),
        f,
    })
}

/// Wrap a closure as a [`ToolCallHook`].
pub fn tool_call_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn ToolCallHook>
where
    F: Fn(&str, &Value) -> Result<ToolCallDecision, HookError> + Send + Sync + 'static,
{
    Arc::new(ToolCallFn(FnHook {
        name: name.into(),
        f,
    }))
}

/// Wrap a closure as a [`ToolResultHook`].
pub fn tool_result_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn ToolResultHook>
where
    F: Fn(&str, &str) -> Result<String, HookError> + Send + Sync + 'static,
{
    Arc::new(ToolResultFn(FnHook {
        name: name.into(),
        f,
    }))
}

/// Wrap a closure as a [`TurnEndHook`].
pub fn turn_end_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn TurnEndHook>
where
    F: Fn(&str, u32) -> Result<(), HookError> + Send + Sync + 'static,
{
    Arc::new(TurnEndFn(FnHook {
        name: name.into(),
        f,
    }))
}

/// Wrap a closure as a [`RunHook`].
pub fn run_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn RunHook>
where
    F: Fn(&str) -> Result<(), HookError> + Send + Sync + 'static,
{
    Arc::new(RunFn(FnHook {
        name: name.into(),
        f,
    }))
}
