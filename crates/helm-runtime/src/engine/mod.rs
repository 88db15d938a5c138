//! Turn execution engine.
//!
//! One [`Engine::prompt`] call executes one turn:
//!
//! 1. open the run (standalone) or reuse the coordinated run, then `turn_start`
//! 2. input hooks over the prompt text
//! 3. user message (`message_start` + `message_end`)
//! 4. assistant message and the tool-calling loop (see `round_trip`)
//! 5. `message_end`, turn-end hooks
//! 6. `turn_end`, and `agent_end` when this call opened the run
//!
//! Step 6 always happens, including on failure, cancellation, or when the
//! future is dropped mid-turn. Failures keep the output that had already
//! streamed.
//!
//! The engine also implements [`RunCoordinator`]: `begin_run` opens the
//! runtime run and fires run-start hooks, `end_run` fires run-end hooks and
//! closes it. Turns executed in between share that single run.

mod round_trip;
mod scope;
pub mod transforms;

use std::sync::Arc;

use async_trait::async_trait;
use helm_core::{Message, Role};
use helm_hooks::HookPipeline;
use helm_llm::{Provider, ProviderRequest, ToolResultEntry};
use helm_tools::ToolRegistry;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::RuntimeError;
use crate::executor::{ExecutionResult, RunCoordinator, TurnExecutor};
use crate::lifecycle::Runtime;

use self::scope::TurnScope;
use self::transforms::{ConvertToProvider, TransformContext, default_convert};

/// Default bound on provider round-trips per turn.
pub const DEFAULT_MAX_ROUND_TRIPS: u32 = 100;

#[derive(Clone)]
struct EngineConfig {
    tools: Arc<ToolRegistry>,
    hooks: Arc<HookPipeline>,
    transform_context: Option<TransformContext>,
    convert_to_provider: Option<ConvertToProvider>,
    max_round_trips: u32,
}

impl EngineConfig {
    fn build_request(&self, messages: &[Message], tool_results: Vec<ToolResultEntry>) -> ProviderRequest {
        let context = match &self.transform_context {
            Some(transform) => transform(messages.to_vec()),
            None => messages.to_vec(),
        };
        let messages = match &self.convert_to_provider {
            Some(convert) => convert(&context),
            None => default_convert(&context),
        };
        ProviderRequest {
            messages,
            tool_names: self.tools.names(),
            tool_results,
        }
    }
}

/// Executes turns against a [`Runtime`], a provider and a tool set.
pub struct Engine {
    runtime: Arc<Runtime>,
    provider: Arc<dyn Provider>,
    config: RwLock<EngineConfig>,
    coordinated: Mutex<Option<String>>,
}

impl Engine {
    /// Create an engine with no tools, an empty hook pipeline and default transforms.
    pub fn new(runtime: Arc<Runtime>, provider: Arc<dyn Provider>) -> Self {
        Self {
            runtime,
            provider,
            config: RwLock::new(EngineConfig {
                tools: Arc::new(ToolRegistry::new()),
                hooks: Arc::new(HookPipeline::new()),
                transform_context: None,
                convert_to_provider: None,
                max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
            }),
            coordinated: Mutex::new(None),
        }
    }

    /// Bound the tool-calling loop (minimum 1).
    #[must_use]
    pub fn with_max_round_trips(self, max: u32) -> Self {
        self.config.write().max_round_trips = max.max(1);
        self
    }

    /// The runtime events are emitted on.
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Current hook pipeline.
    pub fn hooks(&self) -> Arc<HookPipeline> {
        Arc::clone(&self.config.read().hooks)
    }

    /// Replace the active tool set. Takes effect on the next turn.
    pub fn set_tools(&self, tools: ToolRegistry) {
        self.config.write().tools = Arc::new(tools);
    }

    /// Replace the hook pipeline. Takes effect on the next turn.
    pub fn set_hooks(&self, hooks: Arc<HookPipeline>) {
        self.config.write().hooks = hooks;
    }

    /// Install a context transform applied before every round-trip.
    pub fn set_transform_context<F>(&self, transform: F)
    where
        F: Fn(Vec<Message>) -> Vec<Message> + Send + Sync + 'static,
    {
        self.config.write().transform_context = Some(Arc::new(transform));
    }

    /// Install the conversion to provider wire messages.
    pub fn set_convert_to_provider<F>(&self, convert: F)
    where
        F: Fn(&[Message]) -> Vec<helm_llm::ProviderMessage> + Send + Sync + 'static,
    {
        self.config.write().convert_to_provider = Some(Arc::new(convert));
    }

    fn is_coordinating(&self, run_id: &str) -> bool {
        self.coordinated.lock().as_deref() == Some(run_id)
    }

    /// Execute one turn of `run_id` with `text` as the prompt.
    ///
    /// Opens and closes its own run unless `run_id` was opened with
    /// [`RunCoordinator::begin_run`].
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn prompt(&self, cancel: &CancellationToken, run_id: &str, text: &str) -> ExecutionResult {
        let config = self.config.read().clone();
        let owns_run = !self.is_coordinating(run_id);
        if owns_run {
            if let Err(e) = self.runtime.start_run(run_id) {
                warn!(error = %e, "cannot open run");
                return ExecutionResult::failed("", e.into());
            }
        }

        let mut scope = TurnScope::new(&self.runtime, owns_run);
        let mut output = String::new();

        let mut result = if owns_run {
            config
                .hooks
                .run_run_start(cancel, run_id)
                .await
                .map_err(RuntimeError::from)
        } else {
            Ok(())
        };
        let run_started = result.is_ok();
        if run_started {
            result = self
                .run_turn(&config, cancel, run_id, text, &mut scope, &mut output)
                .await;
        }

        if let Err(e) = &result {
            self.fail_turn(&mut scope, cancel, e);
        }
        scope.end_turn();

        if scope.owns_run() && run_started {
            if let Err(e) = config
                .hooks
                .run_run_end(&CancellationToken::new(), run_id)
                .await
            {
                let e = RuntimeError::from(e);
                warn!(error = %e, "run-end hook failed");
                self.runtime.error(e.category(), &e.to_string());
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        scope.end_run();

        match result {
            Ok(()) => {
                debug!(output_len = output.len(), "turn complete");
                ExecutionResult::ok(output)
            }
            Err(e) => ExecutionResult::failed(output, e),
        }
    }

    async fn run_turn(
        &self,
        config: &EngineConfig,
        cancel: &CancellationToken,
        run_id: &str,
        text: &str,
        scope: &mut TurnScope<'_>,
        output: &mut String,
    ) -> Result<(), RuntimeError> {
        let turn = scope.start_turn()?;
        debug!(turn, "turn started");

        let input = config.hooks.run_input(cancel, text).await?;
        if input.handled {
            debug!(turn, "input claimed by hook");
        }

        let _ = scope.open_message(Role::User)?;
        scope.close_message()?;
        let mut messages = vec![Message::user(input.text)];

        let message_id = scope.open_message(Role::Assistant)?;
        self.tool_loop(config, cancel, run_id, &message_id, &mut messages, scope, output)
            .await?;
        scope.close_message()?;

        config.hooks.run_turn_end(cancel, run_id, turn).await?;
        Ok(())
    }

    fn fail_turn(&self, scope: &mut TurnScope<'_>, cancel: &CancellationToken, e: &RuntimeError) {
        if e.is_cancelled() && cancel.is_cancelled() {
            info!("turn cancelled");
            scope.mark_aborting();
        } else {
            error!(error = %e, category = e.category(), "turn failed");
        }
        scope.close_open();
        self.runtime.error(e.category(), &e.to_string());
    }
}

#[async_trait]
impl TurnExecutor for Engine {
    async fn execute(&self, cancel: &CancellationToken, run_id: &str, text: &str) -> ExecutionResult {
        self.prompt(cancel, run_id, text).await
    }

    fn as_run_coordinator(&self) -> Option<&dyn RunCoordinator> {
        Some(self)
    }
}

#[async_trait]
impl RunCoordinator for Engine {
    async fn begin_run(&self, cancel: &CancellationToken, run_id: &str) -> Result<(), RuntimeError> {
        {
            let mut coordinated = self.coordinated.lock();
            if let Some(active) = coordinated.as_deref() {
                return Err(RuntimeError::Coordination(format!(
                    "run {active} is already open"
                )));
            }
            *coordinated = Some(run_id.to_owned());
        }
        if let Err(e) = self.runtime.start_run(run_id) {
            *self.coordinated.lock() = None;
            return Err(e.into());
        }

        let hooks = self.hooks();
        if let Err(e) = hooks.run_run_start(cancel, run_id).await {
            let e = RuntimeError::from(e);
            warn!(run_id, error = %e, "run-start hook failed");
            self.runtime.error(e.category(), &e.to_string());
            *self.coordinated.lock() = None;
            if let Err(end) = self.runtime.end_run() {
                warn!(run_id, error = %end, "failed to close run after run-start failure");
            }
            return Err(e);
        }
        debug!(run_id, "coordinated run opened");
        Ok(())
    }

    async fn end_run(&self, run_id: &str) -> Result<(), RuntimeError> {
        if !self.is_coordinating(run_id) {
            return Err(RuntimeError::Coordination(format!("run {run_id} is not open")));
        }

        let hooks = self.hooks();
        let hook_result = hooks
            .run_run_end(&CancellationToken::new(), run_id)
            .await
            .map_err(RuntimeError::from);
        if let Err(e) = &hook_result {
            warn!(run_id, error = %e, "run-end hook failed");
            self.runtime.error(e.category(), &e.to_string());
        }

        *self.coordinated.lock() = None;
        self.runtime.end_run()?;
        debug!(run_id, "coordinated run closed");
        hook_result
    }
}
