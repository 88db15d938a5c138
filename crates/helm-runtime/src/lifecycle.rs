//! Lifecycle state machine and synchronous event source.
//!
//! [`Runtime`] tracks one run at a time (`idle → running → [aborting] → idle`)
//! and emits an [`Event`] for every accepted operation. Each operation checks
//! the current state and fails with [`LifecycleError::InvalidTransition`]
//! naming the source state and the attempted target.
//!
//! Nesting of turn / message / tool scopes is not validated here; the engine
//! is responsible for issuing well-nested calls.
//!
//! Listeners run synchronously on the calling thread, in registration order,
//! after the state lock is released. A separate re-entrant ordering lock is
//! held across validation and dispatch, so events reach listeners in exactly
//! the order the operations were accepted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use helm_core::{Event, EventType, Role};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::LifecycleError;

/// Run state shared by the runtime and the command loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No active run.
    #[default]
    Idle,
    /// A run is executing.
    Running,
    /// Abort requested; the run is winding down.
    Aborting,
}

impl RunState {
    /// Wire name of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Aborting => "aborting",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event listener registered with [`Runtime::subscribe`].
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

type ListenerList = Mutex<Vec<(u64, Listener)>>;

/// Handle returned by [`Runtime::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// Remove the listener. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[derive(Debug, Default)]
struct RunSlot {
    state: RunState,
    run_id: String,
    turn: u32,
}

const ACTIVE: &[RunState] = &[RunState::Running, RunState::Aborting];
const RUNNING: &[RunState] = &[RunState::Running];
const IDLE: &[RunState] = &[RunState::Idle];

/// Lifecycle tracker and event emitter for one run at a time.
pub struct Runtime {
    slot: Mutex<RunSlot>,
    listeners: Arc<ListenerList>,
    next_listener: AtomicU64,
    order: ReentrantMutex<()>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create an idle runtime with no listeners.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(RunSlot::default()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
            order: ReentrantMutex::new(()),
        }
    }

    // ── snapshots ───────────────────────────────────────────────────

    /// Current state.
    pub fn state(&self) -> RunState {
        self.slot.lock().state
    }

    /// Id of the active run, empty when idle.
    pub fn current_run_id(&self) -> String {
        self.slot.lock().run_id.clone()
    }

    /// Turns started in the active run.
    pub fn current_turn(&self) -> u32 {
        self.slot.lock().turn
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    // ── listeners ───────────────────────────────────────────────────

    /// Register a listener for every emitted event.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    // ── run ─────────────────────────────────────────────────────────

    /// `idle → running`; resets the turn counter and emits `agent_start`.
    pub fn start_run(&self, run_id: &str) -> Result<(), LifecycleError> {
        self.apply("running", IDLE, |slot| {
            if run_id.is_empty() {
                return Err(LifecycleError::EmptyRunId);
            }
            slot.state = RunState::Running;
            slot.run_id = run_id.to_owned();
            slot.turn = 0;
            debug!(run_id, "run started");
            Ok(Event::now(EventType::AgentStart, run_id, 0))
        })
    }

    /// `running → aborting`. Emits nothing.
    pub fn abort_run(&self) -> Result<(), LifecycleError> {
        let _order = self.order.lock();
        let mut slot = self.slot.lock();
        if slot.state != RunState::Running {
            return Err(LifecycleError::InvalidTransition {
                from: slot.state,
                to: "aborting",
            });
        }
        slot.state = RunState::Aborting;
        debug!(run_id = %slot.run_id, "run aborting");
        Ok(())
    }

    /// `running | aborting → idle`; emits `agent_end` and clears the run.
    pub fn end_run(&self) -> Result<(), LifecycleError> {
        self.apply("idle", ACTIVE, |slot| {
            let event = Event::now(EventType::AgentEnd, slot.run_id.as_str(), slot.turn);
            debug!(run_id = %slot.run_id, turns = slot.turn, "run ended");
            *slot = RunSlot::default();
            Ok(event)
        })
    }

    // ── turn ────────────────────────────────────────────────────────

    /// Increment the turn counter and emit `turn_start`. Returns the new turn number.
    pub fn start_turn(&self) -> Result<u32, LifecycleError> {
        let event = self.apply_with("turn_start", RUNNING, |slot| {
            slot.turn += 1;
            Ok(Event::now(EventType::TurnStart, slot.run_id.as_str(), slot.turn))
        })?;
        Ok(event.turn)
    }

    /// Emit `turn_end`. The counter keeps counting turns started in the run.
    pub fn end_turn(&self) -> Result<(), LifecycleError> {
        self.apply("turn_end", ACTIVE, |slot| {
            if slot.turn == 0 {
                return Err(LifecycleError::NoTurn);
            }
            Ok(Event::now(EventType::TurnEnd, slot.run_id.as_str(), slot.turn))
        })
    }

    // ── messages ────────────────────────────────────────────────────

    /// Emit `message_start` for `message_id` with `role`.
    pub fn message_start(&self, message_id: &str, role: Role) -> Result<(), LifecycleError> {
        self.message_event("message_start", EventType::MessageStart, message_id, Some(role), "")
    }

    /// Emit `message_update` carrying `delta`.
    pub fn message_update(&self, message_id: &str, delta: &str) -> Result<(), LifecycleError> {
        self.message_event("message_update", EventType::MessageUpdate, message_id, None, delta)
    }

    /// Emit `message_end`.
    pub fn message_end(&self, message_id: &str) -> Result<(), LifecycleError> {
        self.message_event("message_end", EventType::MessageEnd, message_id, None, "")
    }

    fn message_event(
        &self,
        op: &'static str,
        event_type: EventType,
        message_id: &str,
        role: Option<Role>,
        delta: &str,
    ) -> Result<(), LifecycleError> {
        self.apply(op, ACTIVE, |slot| {
            if message_id.is_empty() {
                return Err(LifecycleError::EmptyMessageId);
            }
            Ok(Event::now(event_type, slot.run_id.as_str(), slot.turn)
                .with_message(message_id, role)
                .with_delta(delta))
        })
    }

    // ── tool executions ─────────────────────────────────────────────

    /// Emit `tool_execution_start`.
    pub fn tool_execution_start(&self, tool_call_id: &str, tool_name: &str) -> Result<(), LifecycleError> {
        self.tool_event("tool_execution_start", EventType::ToolExecutionStart, tool_call_id, tool_name, "")
    }

    /// Emit `tool_execution_update` carrying `delta`.
    pub fn tool_execution_update(
        &self,
        tool_call_id: &str,
        tool_name: &str,
        delta: &str,
    ) -> Result<(), LifecycleError> {
        self.tool_event("tool_execution_update", EventType::ToolExecutionUpdate, tool_call_id, tool_name, delta)
    }

    /// Emit `tool_execution_end`.
    pub fn tool_execution_end(&self, tool_call_id: &str, tool_name: &str) -> Result<(), LifecycleError> {
        self.tool_event("tool_execution_end", EventType::ToolExecutionEnd, tool_call_id, tool_name, "")
    }

    fn tool_event(
        &self,
        op: &'static str,
        event_type: EventType,
        tool_call_id: &str,
        tool_name: &str,
        delta: &str,
    ) -> Result<(), LifecycleError> {
        self.apply(op, ACTIVE, |slot| {
            if tool_call_id.is_empty() || tool_name.is_empty() {
                return Err(LifecycleError::EmptyToolCall);
            }
            Ok(Event::now(event_type, slot.run_id.as_str(), slot.turn)
                .with_tool(tool_call_id, tool_name)
                .with_delta(delta))
        })
    }

    // ── point events ────────────────────────────────────────────────

    /// Emit a `status` event. Allowed in any state.
    pub fn status(&self, code: &str, message: &str) {
        self.point(EventType::Status, code, message);
    }

    /// Emit a `warning` event. Allowed in any state.
    pub fn warning(&self, code: &str, message: &str) {
        self.point(EventType::Warning, code, message);
    }

    /// Emit an `error` event. Allowed in any state.
    pub fn error(&self, code: &str, message: &str) {
        self.point(EventType::Error, code, message);
    }

    fn point(&self, event_type: EventType, code: &str, message: &str) {
        let _order = self.order.lock();
        let event = {
            let slot = self.slot.lock();
            Event::now(event_type, slot.run_id.as_str(), slot.turn).with_notice(code, message)
        };
        self.dispatch(&event);
    }

    // ── internals ───────────────────────────────────────────────────

    fn apply<F>(&self, op: &'static str, allowed: &[RunState], f: F) -> Result<(), LifecycleError>
    where
        F: FnOnce(&mut RunSlot) -> Result<Event, LifecycleError>,
    {
        self.apply_with(op, allowed, f).map(|_| ())
    }

    /// Validate, mutate and build the event under the state lock, then
    /// dispatch with the state lock released.
    fn apply_with<F>(&self, op: &'static str, allowed: &[RunState], f: F) -> Result<Event, LifecycleError>
    where
        F: FnOnce(&mut RunSlot) -> Result<Event, LifecycleError>,
    {
        let _order = self.order.lock();
        let event = {
            let mut slot = self.slot.lock();
            if !allowed.contains(&slot.state) {
                return Err(LifecycleError::InvalidTransition {
                    from: slot.state,
                    to: op,
                });
            }
            f(&mut slot)?
        };
        self.dispatch(&event);
        Ok(event)
    }

    fn dispatch(&self, event: &Event) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}
