//! Command loop: one background task per run, priority turn selection.
//!
//! [`CommandLoop::prompt`] starts a run and returns its id immediately. The
//! run's task executes the prompt turn, then keeps pulling turns from the
//! queues (steers before follow-ups) until both are empty or the run is
//! aborted. Callers may steer, follow up or abort from any thread while the
//! task is executing; the loop lock is never held across `execute`.
//!
//! When the executor exposes a [`RunCoordinator`], `begin_run` is called once
//! before the first turn and `end_run` once after the last. A turn that panics
//! is reported as an internal error and the run still ends through `end_run`.

pub mod queue;
pub mod types;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use helm_core::QueueMode;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{CommandError, RuntimeError};
use crate::executor::{ExecutionResult, RunCoordinator, TurnExecutor};
use crate::lifecycle::RunState;

use self::queue::TurnQueue;
pub use self::types::{TurnEndCallback, TurnKind, TurnReport};

/// Thread-safe handle to a command loop. Clones share the same loop.
#[derive(Clone)]
pub struct CommandLoop {
    shared: Arc<Shared>,
}

struct Shared {
    executor: Arc<dyn TurnExecutor>,
    /// Runtime that run tasks are spawned on.
    handle: Option<Handle>,
    inner: Mutex<LoopState>,
    on_turn_end: RwLock<Option<TurnEndCallback>>,
    state_tx: watch::Sender<RunState>,
}

#[derive(Default)]
struct LoopState {
    state: RunState,
    run_id: Option<String>,
    counter: u64,
    queue: TurnQueue,
    cancel: Option<CancellationToken>,
    /// Cleared once the run has committed to finishing; late steers and
    /// follow-ups are rejected instead of silently dropped.
    accepting: bool,
}

impl LoopState {
    fn accepts_commands(&self) -> bool {
        self.state == RunState::Running && self.accepting
    }
}

struct PendingTurn {
    kind: TurnKind,
    input: String,
    execution: String,
}

impl CommandLoop {
    /// Create an idle loop driving `executor`.
    ///
    /// Runs are spawned on the Tokio runtime current at construction. A loop
    /// built outside any runtime falls back to the runtime current at
    /// [`prompt`](Self::prompt) time.
    pub fn new(executor: Arc<dyn TurnExecutor>) -> Self {
        Self::build(executor, Handle::try_current().ok())
    }

    /// Create an idle loop that spawns its runs on `handle`, so commands can
    /// be issued from threads outside the runtime.
    pub fn with_handle(executor: Arc<dyn TurnExecutor>, handle: Handle) -> Self {
        Self::build(executor, Some(handle))
    }

    fn build(executor: Arc<dyn TurnExecutor>, handle: Option<Handle>) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            shared: Arc::new(Shared {
                executor,
                handle,
                inner: Mutex::new(LoopState::default()),
                on_turn_end: RwLock::new(None),
                state_tx,
            }),
        }
    }

    /// Start a run with `text` as its first turn. Returns the new run id.
    ///
    /// The run executes on a spawned task. Fails with `no_runtime` when the
    /// loop has no runtime handle and the caller is outside a runtime.
    pub fn prompt(&self, text: &str) -> Result<String, CommandError> {
        self.prompt_with_execution_text(text, text)
    }

    /// Start a run that reports `raw` as the turn input but executes
    /// `execution`. A blank `execution` falls back to `raw`.
    pub fn prompt_with_execution_text(&self, raw: &str, execution: &str) -> Result<String, CommandError> {
        if raw.trim().is_empty() {
            return Err(CommandError::EmptyPrompt);
        }
        let execution = if execution.trim().is_empty() { raw } else { execution };
        let handle = self
            .shared
            .handle
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or(CommandError::NoRuntime)?;

        let (run_id, cancel) = {
            let mut inner = self.shared.inner.lock();
            if inner.state != RunState::Idle {
                return Err(CommandError::RunInProgress);
            }
            inner.counter += 1;
            let run_id = format!("run-{}", inner.counter);
            let cancel = CancellationToken::new();
            inner.state = RunState::Running;
            inner.run_id = Some(run_id.clone());
            inner.cancel = Some(cancel.clone());
            inner.accepting = true;
            self.shared.publish(RunState::Running);
            (run_id, cancel)
        };
        info!(run_id, "run started");

        let first = PendingTurn {
            kind: TurnKind::Prompt,
            input: raw.to_owned(),
            execution: execution.to_owned(),
        };
        let _ = handle.spawn(run_loop(
            Arc::clone(&self.shared),
            run_id.clone(),
            cancel,
            first,
        ));
        Ok(run_id)
    }

    /// Queue a steering command for the active run.
    pub fn steer(&self, text: &str) -> Result<(), CommandError> {
        if text.trim().is_empty() {
            return Err(CommandError::EmptySteer);
        }
        let mut inner = self.shared.inner.lock();
        if !inner.accepts_commands() {
            return Err(CommandError::NoActiveRun);
        }
        inner.queue.push_steer(text.to_owned());
        debug!(run_id = ?inner.run_id, pending = ?inner.queue.pending(), "steer queued");
        Ok(())
    }

    /// Queue a follow-up for the active run.
    pub fn follow_up(&self, text: &str) -> Result<(), CommandError> {
        if text.trim().is_empty() {
            return Err(CommandError::EmptyFollowUp);
        }
        let mut inner = self.shared.inner.lock();
        if !inner.accepts_commands() {
            return Err(CommandError::NoActiveRun);
        }
        inner.queue.push_follow_up(text.to_owned());
        debug!(run_id = ?inner.run_id, pending = ?inner.queue.pending(), "follow-up queued");
        Ok(())
    }

    /// Abort the active run: drop queued turns and cancel the in-flight one.
    pub fn abort(&self) -> Result<(), CommandError> {
        let (run_id, cancel) = {
            let mut inner = self.shared.inner.lock();
            if inner.state != RunState::Running {
                return Err(CommandError::NoActiveRun);
            }
            inner.queue.clear();
            inner.state = RunState::Aborting;
            inner.accepting = false;
            self.shared.publish(RunState::Aborting);
            (inner.run_id.clone(), inner.cancel.clone())
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        info!(?run_id, "run aborted");
        Ok(())
    }

    /// Applies to the next steer taken from the queue.
    pub fn set_steering_mode(&self, mode: QueueMode) {
        self.shared.inner.lock().queue.set_steering_mode(mode);
    }

    /// Applies to the next follow-up taken from the queue.
    pub fn set_follow_up_mode(&self, mode: QueueMode) {
        self.shared.inner.lock().queue.set_follow_up_mode(mode);
    }

    /// Set the steering mode from its wire name (`sequential` / `batch-all`).
    pub fn set_steering_mode_by_name(&self, name: &str) -> Result<(), CommandError> {
        self.set_steering_mode(name.parse()?);
        Ok(())
    }

    /// Set the follow-up mode from its wire name (`sequential` / `batch-all`).
    pub fn set_follow_up_mode_by_name(&self, name: &str) -> Result<(), CommandError> {
        self.set_follow_up_mode(name.parse()?);
        Ok(())
    }

    /// Current steering mode.
    pub fn steering_mode(&self) -> QueueMode {
        self.shared.inner.lock().queue.steering_mode()
    }

    /// Current follow-up mode.
    pub fn follow_up_mode(&self) -> QueueMode {
        self.shared.inner.lock().queue.follow_up_mode()
    }

    /// Current loop state.
    pub fn state(&self) -> RunState {
        self.shared.inner.lock().state
    }

    /// Id of the active run, if any.
    pub fn current_run_id(&self) -> Option<String> {
        self.shared.inner.lock().run_id.clone()
    }

    /// `(steers, follow_ups)` waiting in the queues.
    pub fn pending(&self) -> (usize, usize) {
        self.shared.inner.lock().queue.pending()
    }

    /// Register the turn-end callback, replacing any previous one.
    pub fn set_on_turn_end<F>(&self, callback: F)
    where
        F: Fn(&TurnReport) + Send + Sync + 'static,
    {
        *self.shared.on_turn_end.write() = Some(Arc::new(callback));
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.shared.state_tx.subscribe()
    }

    /// Resolve once the loop is idle. Returns immediately when already idle.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.subscribe_state();
        let _ = rx.wait_for(|state| *state == RunState::Idle).await;
    }
}

impl Shared {
    /// Must be called with `inner` held so watchers see transitions in order.
    fn publish(&self, state: RunState) {
        let _ = self.state_tx.send_replace(state);
    }

    fn next_turn(&self) -> Option<PendingTurn> {
        let mut inner = self.inner.lock();
        if inner.state != RunState::Running {
            return None;
        }
        match inner.queue.next_turn() {
            Some((kind, text)) => Some(PendingTurn {
                kind,
                input: text.clone(),
                execution: text,
            }),
            None => {
                inner.accepting = false;
                None
            }
        }
    }

    fn finish(&self, run_id: &str) {
        let mut inner = self.inner.lock();
        if inner.run_id.as_deref() != Some(run_id) {
            return;
        }
        inner.state = RunState::Idle;
        inner.run_id = None;
        inner.cancel = None;
        inner.accepting = false;
        inner.queue.clear();
        self.publish(RunState::Idle);
        info!(run_id, "run finished");
    }

    fn report(&self, report: &TurnReport) {
        let callback = self.on_turn_end.read().clone();
        if let Some(callback) = callback {
            callback(report);
        }
    }
}

/// Returns the loop to idle when the run task ends, including by panic.
struct ActiveRun<'a> {
    shared: &'a Shared,
    run_id: &'a str,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.shared.finish(self.run_id);
    }
}

#[instrument(skip_all, fields(run_id = %run_id))]
async fn run_loop(shared: Arc<Shared>, run_id: String, cancel: CancellationToken, first: PendingTurn) {
    let active = ActiveRun {
        shared: &shared,
        run_id: &run_id,
    };
    let executor = Arc::clone(&shared.executor);
    let coordinator: Option<&dyn RunCoordinator> = executor.as_run_coordinator();

    if let Some(coordinator) = coordinator {
        if let Err(e) = coordinator.begin_run(&cancel, &run_id).await {
            warn!(error = %e, "begin-run failed, no turn executed");
            drop(active);
            let error = match e {
                RuntimeError::Coordination(_) | RuntimeError::Cancelled => e,
                other => RuntimeError::Coordination(other.to_string()),
            };
            shared.report(&TurnReport {
                run_id: run_id.clone(),
                kind: first.kind,
                input: first.input,
                output: String::new(),
                error: Some(error),
            });
            return;
        }
    }

    let mut turn = first;
    let mut executed = 0_u32;
    loop {
        debug!(kind = %turn.kind, "executing turn");
        let result = AssertUnwindSafe(executor.execute(&cancel, &run_id, &turn.execution))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!(kind = %turn.kind, panic = %message, "turn panicked");
                ExecutionResult::failed("", RuntimeError::Internal(format!("turn panicked: {message}")))
            });
        executed += 1;
        shared.report(&TurnReport {
            run_id: run_id.clone(),
            kind: turn.kind,
            input: turn.input,
            output: result.output,
            error: result.error,
        });
        match shared.next_turn() {
            Some(next) => turn = next,
            None => break,
        }
    }
    debug!(turns = executed, "turn queue drained");

    if let Some(coordinator) = coordinator {
        if let Err(e) = coordinator.end_run(&run_id).await {
            warn!(error = %e, "end-run failed");
        }
    }
    drop(active);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
