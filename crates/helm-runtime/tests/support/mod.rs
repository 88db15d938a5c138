//! Shared fixtures for the runtime integration tests.

#![allow(dead_code, unreachable_pub)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use helm_core::{Event, EventType};
use helm_runtime::{ExecutionResult, RunCoordinator, Runtime, RuntimeError, TurnExecutor};
use helm_tools::{Tool, ToolContext, ToolError};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Record every event the runtime emits.
pub fn record(runtime: &Runtime) -> Arc<Mutex<Vec<Event>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _sub = runtime.subscribe(move |e| sink.lock().push(e.clone()));
    events
}

/// Event type names in order.
pub fn names(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(Event::type_name).collect()
}

/// Check per-run nesting of every scope in `events`.
pub fn assert_well_nested(events: &[Event]) {
    #[derive(Default)]
    struct Depth {
        started: u32,
        ended: u32,
        turns: i64,
        messages: Vec<String>,
        tools: Vec<String>,
    }

    let mut runs: HashMap<&str, Depth> = HashMap::new();
    for event in events {
        if event.event_type.is_point() {
            continue;
        }
        let depth = runs.entry(event.run_id.as_str()).or_default();
        assert_eq!(depth.ended, 0, "event after agent_end: {event:?}");
        match event.event_type {
            EventType::AgentStart => depth.started += 1,
            EventType::AgentEnd => {
                assert_eq!(depth.turns, 0, "agent_end with open turn");
                assert!(depth.messages.is_empty(), "agent_end with open message");
                assert!(depth.tools.is_empty(), "agent_end with open tool");
                depth.ended += 1;
            }
            EventType::TurnStart => depth.turns += 1,
            EventType::TurnEnd => {
                depth.turns -= 1;
                assert!(depth.turns >= 0, "turn_end without turn_start");
            }
            EventType::MessageStart => depth.messages.push(message_id(event)),
            EventType::MessageUpdate => {
                assert!(depth.messages.contains(&message_id(event)), "update outside message");
            }
            EventType::MessageEnd => {
                let id = message_id(event);
                assert_eq!(depth.messages.pop(), Some(id), "message_end out of order");
            }
            EventType::ToolExecutionStart => depth.tools.push(tool_id(event)),
            EventType::ToolExecutionUpdate => {
                assert!(depth.tools.contains(&tool_id(event)), "update outside tool call");
            }
            EventType::ToolExecutionEnd => {
                let id = tool_id(event);
                assert_eq!(depth.tools.pop(), Some(id), "tool_execution_end out of order");
            }
            EventType::Status | EventType::Warning | EventType::Error => {}
        }
        assert_eq!(depth.started, 1, "events before agent_start: {event:?}");
    }
    for (run_id, depth) in runs {
        assert_eq!(depth.started, 1, "run {run_id} started {} times", depth.started);
        assert_eq!(depth.ended, 1, "run {run_id} ended {} times", depth.ended);
    }
}

fn message_id(event: &Event) -> String {
    event.message_id.clone().unwrap_or_default()
}

fn tool_id(event: &Event) -> String {
    event.tool_call_id.clone().unwrap_or_default()
}

/// Tool that returns `"<name> result"`.
pub struct NamedTool(pub &'static str);

#[async_trait]
impl Tool for NamedTool {
    fn name(&self) -> &str {
        self.0
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        Ok(format!("{} result", self.0))
    }
}

/// Tool that blocks until its cancellation token fires.
pub struct StuckTool {
    pub started: Arc<Notify>,
}

#[async_trait]
impl Tool for StuckTool {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        self.started.notify_one();
        ctx.cancellation.cancelled().await;
        Err(ToolError::Cancelled)
    }
}

/// Tool whose execution panics.
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "explode"
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        panic!("tool exploded");
    }
}

/// Scheduler-level executor that records inputs and optionally holds the
/// first turn, or `end_run`, until released.
#[derive(Default)]
pub struct RecordingExecutor {
    pub gate: Option<Arc<Notify>>,
    pub started: Arc<Notify>,
    pub coordinate: bool,
    pub fail_begin: bool,
    pub end_gate: Option<Arc<Notify>>,
    pub ending: Arc<Notify>,
    pub texts: Mutex<Vec<String>>,
    pub begins: Mutex<Vec<String>>,
    pub ends: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl RecordingExecutor {
    /// Executor whose first turn waits for `gate`.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

#[async_trait]
impl TurnExecutor for RecordingExecutor {
    async fn execute(&self, cancel: &CancellationToken, _run_id: &str, text: &str) -> ExecutionResult {
        self.texts.lock().push(text.to_owned());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            self.started.notify_one();
            if let Some(gate) = &self.gate {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return ExecutionResult::failed("partial", RuntimeError::Cancelled);
                    }
                    () = gate.notified() => {}
                }
            }
        }
        ExecutionResult::ok(format!("done: {text}"))
    }

    fn as_run_coordinator(&self) -> Option<&dyn RunCoordinator> {
        if self.coordinate { Some(self) } else { None }
    }
}

#[async_trait]
impl RunCoordinator for RecordingExecutor {
    async fn begin_run(&self, _cancel: &CancellationToken, run_id: &str) -> Result<(), RuntimeError> {
        self.begins.lock().push(run_id.to_owned());
        if self.fail_begin {
            return Err(RuntimeError::Internal("backend unavailable".into()));
        }
        Ok(())
    }

    async fn end_run(&self, run_id: &str) -> Result<(), RuntimeError> {
        self.ends.lock().push(run_id.to_owned());
        self.ending.notify_one();
        if let Some(gate) = &self.end_gate {
            gate.notified().await;
        }
        Ok(())
    }
}
