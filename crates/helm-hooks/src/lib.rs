//! # helm-hooks
//!
//! Ordered hook chains that observe and mutate turn execution.
//!
//! Six categories, each an append-only list evaluated in registration order:
//! - **Input** ([`handler::InputHook`]): rewrite the prompt, optionally mark
//!   it handled (stops the chain)
//! - **Tool call** ([`handler::ToolCallHook`]): the first hook that blocks
//!   rejects the call
//! - **Tool result** ([`handler::ToolResultHook`]): left-to-right mutation of
//!   tool output
//! - **Turn end** ([`handler::TurnEndHook`]): observers after a turn closes
//! - **Run start / run end** ([`handler::RunHook`]): once-per-run observers
//!
//! ## Execution Model
//!
//! Every chain runs against a snapshot taken at call time, so a hook
//! registered mid-run never joins a chain already in flight. Each invocation
//! races the cancellation token and an optional timeout. Any hook error stops
//! the chain and is returned to the caller.
//!
//! ## Crate Position
//!
//! Standalone. Depended on by helm-runtime.

#![deny(unsafe_code)]

pub mod errors;
pub mod handler;
pub mod pipeline;

pub use errors::HookError;
pub use handler::{
    InputHook, InputOutcome, RunHook, ToolCallDecision, ToolCallHook, ToolResultHook, TurnEndHook,
    input_fn, run_fn, tool_call_fn, tool_result_fn, turn_end_fn,
};
pub use pipeline::{DEFAULT_BLOCK_REASON, HookCounts, HookPipeline};
