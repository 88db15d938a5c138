//! Hook pipeline: registration and chain execution.
//!
//! Registration is append-only and may happen concurrently with execution.
//! Each `run_*` call clones the current list under a read lock and releases
//! the lock before awaiting any hook.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::HookError;
use crate::handler::{
    InputHook, InputOutcome, RunHook, ToolCallDecision, ToolCallHook, ToolResultHook, TurnEndHook,
};

/// Reason attached to a block when the hook gave none.
pub const DEFAULT_BLOCK_REASON: &str = "blocked_by_extension";

/// Number of registered hooks per category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookCounts {
    /// Input hooks.
    pub input: usize,
    /// Tool-call hooks.
    pub tool_call: usize,
    /// Tool-result hooks.
    pub tool_result: usize,
    /// Turn-end hooks.
    pub turn_end: usize,
    /// Run-start hooks.
    pub run_start: usize,
    /// Run-end hooks.
    pub run_end: usize,
}

/// Ordered hook chains with snapshot execution.
#[derive(Default)]
pub struct HookPipeline {
    input: RwLock<Vec<Arc<dyn InputHook>>>,
    tool_call: RwLock<Vec<Arc<dyn ToolCallHook>>>,
    tool_result: RwLock<Vec<Arc<dyn ToolResultHook>>>,
    turn_end: RwLock<Vec<Arc<dyn TurnEndHook>>>,
    run_start: RwLock<Vec<Arc<dyn RunHook>>>,
    run_end: RwLock<Vec<Arc<dyn RunHook>>>,
    timeout: Option<Duration>,
}

impl HookPipeline {
    /// Create an empty pipeline without a per-hook timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every hook invocation by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Configured per-hook timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Append an input hook.
    pub fn register_input(&self, hook: Arc<dyn InputHook>) {
        debug!(hook = hook.name(), "input hook registered");
        self.input.write().push(hook);
    }

    /// Append a tool-call hook.
    pub fn register_tool_call(&self, hook: Arc<dyn ToolCallHook>) {
        debug!(hook = hook.name(), "tool-call hook registered");
        self.tool_call.write().push(hook);
    }

    /// Append a tool-result hook.
    pub fn register_tool_result(&self, hook: Arc<dyn ToolResultHook>) {
        debug!(hook = hook.name(), "tool-result hook registered");
        self.tool_result.write().push(hook);
    }

    /// Append a turn-end hook.
    pub fn register_turn_end(&self, hook: Arc<dyn TurnEndHook>) {
        debug!(hook = hook.name(), "turn-end hook registered");
        self.turn_end.write().push(hook);
    }

    /// Append a run-start hook.
    pub fn register_run_start(&self, hook: Arc<dyn RunHook>) {
        debug!(hook = hook.name(), "run-start hook registered");
        self.run_start.write().push(hook);
    }

    /// Append a run-end hook.
    pub fn register_run_end(&self, hook: Arc<dyn RunHook>) {
        debug!(hook = hook.name(), "run-end hook registered");
        self.run_end.write().push(hook);
    }

    /// Registered hook counts.
    pub fn counts(&self) -> HookCounts {
        HookCounts {
            input: self.input.read().len(),
            tool_call: self.tool_call.read().len(),
            tool_result: self.tool_result.read().len(),
            turn_end: self.turn_end.read().len(),
            run_start: self.run_start.read().len(),
            run_end: self.run_end.read().len(),
        }
    }

    /// Run the input chain over `text`.
    ///
    /// Non-empty outputs replace the running text. A `handled` outcome stops
    /// the chain and is returned with the text at that point.
    pub async fn run_input(
        &self,
        cancel: &CancellationToken,
        text: &str,
    ) -> Result<InputOutcome, HookError> {
        let hooks = self.input.read().clone();
        let mut current = text.to_owned();
        for hook in hooks {
            let outcome = self.guard(hook.name(), cancel, hook.on_input(&current)).await?;
            if !outcome.text.is_empty() {
                current = outcome.text;
            }
            if outcome.handled {
                debug!(hook = hook.name(), "input handled, chain stopped");
                return Ok(InputOutcome::handled(current));
            }
        }
        Ok(InputOutcome {
            text: current,
            handled: false,
        })
    }

    /// Run the tool-call chain. The first block wins.
    pub async fn run_tool_call(
        &self,
        cancel: &CancellationToken,
        tool_name: &str,
        args: &Value,
    ) -> Result<ToolCallDecision, HookError> {
        let hooks = self.tool_call.read().clone();
        for hook in hooks {
            let decision = self
                .guard(hook.name(), cancel, hook.on_tool_call(tool_name, args))
                .await?;
            if decision.blocked {
                let reason = decision
                    .reason
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| DEFAULT_BLOCK_REASON.to_owned());
                warn!(hook = hook.name(), tool_name, %reason, "tool call blocked");
                return Ok(ToolCallDecision::block(reason));
            }
        }
        Ok(ToolCallDecision::allow())
    }

    /// Run the tool-result chain, feeding each non-empty output forward.
    pub async fn run_tool_result(
        &self,
        cancel: &CancellationToken,
        tool_name: &str,
        result: String,
    ) -> Result<String, HookError> {
        let hooks = self.tool_result.read().clone();
        let mut current = result;
        for hook in hooks {
            let next = self
                .guard(hook.name(), cancel, hook.on_tool_result(tool_name, &current))
                .await?;
            if !next.is_empty() {
                current = next;
            }
        }
        Ok(current)
    }

    /// Run every turn-end hook. Stops at the first error.
    pub async fn run_turn_end(
        &self,
        cancel: &CancellationToken,
        run_id: &str,
        turn: u32,
    ) -> Result<(), HookError> {
        let hooks = self.turn_end.read().clone();
        for hook in hooks {
            self.guard(hook.name(), cancel, hook.on_turn_end(run_id, turn))
                .await?;
        }
        Ok(())
    }

    /// Run every run-start hook. Stops at the first error.
    pub async fn run_run_start(
        &self,
        cancel: &CancellationToken,
        run_id: &str,
    ) -> Result<(), HookError> {
        let hooks = self.run_start.read().clone();
        self.run_observers(hooks, cancel, run_id).await
    }

    /// Run every run-end hook. Stops at the first error.
    pub async fn run_run_end(
        &self,
        cancel: &CancellationToken,
        run_id: &str,
    ) -> Result<(), HookError> {
        let hooks = self.run_end.read().clone();
        self.run_observers(hooks, cancel, run_id).await
    }

    async fn run_observers(
        &self,
        hooks: Vec<Arc<dyn RunHook>>,
        cancel: &CancellationToken,
        run_id: &str,
    ) -> Result<(), HookError> {
        for hook in hooks {
            self.guard(hook.name(), cancel, hook.on_run(run_id)).await?;
        }
        Ok(())
    }

    /// Race one hook invocation against cancellation and the timeout.
    async fn guard<T, F>(
        &self,
        name: &str,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<T, HookError>
    where
        F: Future<Output = Result<T, HookError>>,
    {
        let bounded = async {
            let Some(limit) = self.timeout else {
                return fut.await;
            };
            match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    warn!(hook = name, timeout_ms, "hook timed out");
                    Err(HookError::Timeout {
                        name: name.to_owned(),
                        timeout_ms,
                    })
                }
            }
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(HookError::Cancelled { name: name.to_owned() }),
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::handler::{input_fn, run_fn, tool_call_fn, tool_result_fn, turn_end_fn};

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    // ── input ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn input_chain_rewrites_in_order() {
        let pipeline = HookPipeline::new();
        pipeline.register_input(input_fn("a", |t: &str| Ok(InputOutcome::rewrite(format!("{t}-a")))));
        pipeline.register_input(input_fn("keep", |_t: &str| Ok(InputOutcome::unchanged())));
        pipeline.register_input(input_fn("b", |t: &str| Ok(InputOutcome::rewrite(format!("{t}-b")))));

        let out = pipeline.run_input(&cancel(), "x").await.unwrap();
        assert_eq!(out, InputOutcome::rewrite("x-a-b"));
    }

    #[tokio::test]
    async fn handled_input_stops_chain() {
        let later = Arc::new(AtomicUsize::new(0));
        let pipeline = HookPipeline::new();
        pipeline.register_input(input_fn("claim", |_t: &str| Ok(InputOutcome::handled("claimed"))));
        let seen = Arc::clone(&later);
        pipeline.register_input(input_fn("later", move |_t: &str| {
            let _ = seen.fetch_add(1, Ordering::SeqCst);
            Ok(InputOutcome::unchanged())
        }));

        let out = pipeline.run_input(&cancel(), "x").await.unwrap();
        assert_eq!(out, InputOutcome::handled("claimed"));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handled_with_empty_text_keeps_running_text() {
        let pipeline = HookPipeline::new();
        pipeline.register_input(input_fn("claim", |_t: &str| Ok(InputOutcome::handled(""))));
        let out = pipeline.run_input(&cancel(), "orig").await.unwrap();
        assert_eq!(out, InputOutcome::handled("orig"));
    }

    #[tokio::test]
    async fn input_error_aborts() {
        let pipeline = HookPipeline::new();
        pipeline.register_input(input_fn("bad", |_t: &str| Err(HookError::handler("bad", "nope"))));
        assert_matches!(
            pipeline.run_input(&cancel(), "x").await,
            Err(HookError::Handler { name, .. }) if name == "bad"
        );
    }

    #[tokio::test]
    async fn empty_pipeline_passes_through() {
        let pipeline = HookPipeline::new();
        let out = pipeline.run_input(&cancel(), "x").await.unwrap();
        assert_eq!(out, InputOutcome::rewrite("x"));
        assert!(!pipeline.run_tool_call(&cancel(), "t", &json!({})).await.unwrap().blocked);
        assert_eq!(
            pipeline.run_tool_result(&cancel(), "t", "raw".into()).await.unwrap(),
            "raw"
        );
        assert_eq!(pipeline.counts(), HookCounts::default());
    }

    // ── tool call ───────────────────────────────────────────────────

    #[tokio::test]
    async fn first_block_wins_with_default_reason() {
        let second = Arc::new(AtomicUsize::new(0));
        let pipeline = HookPipeline::new();
        pipeline.register_tool_call(tool_call_fn("blocker", |name: &str, _a: &Value| {
            Ok(ToolCallDecision {
                blocked: name == "second",
                reason: None,
            })
        }));
        let seen = Arc::clone(&second);
        pipeline.register_tool_call(tool_call_fn("counter", move |_n: &str, _a: &Value| {
            let _ = seen.fetch_add(1, Ordering::SeqCst);
            Ok(ToolCallDecision::block("custom"))
        }));

        let decision = pipeline
            .run_tool_call(&cancel(), "second", &json!({}))
            .await
            .unwrap();
        assert_eq!(decision, ToolCallDecision::block(DEFAULT_BLOCK_REASON));
        assert_eq!(second.load(Ordering::SeqCst), 0);

        let decision = pipeline
            .run_tool_call(&cancel(), "first", &json!({}))
            .await
            .unwrap();
        assert_eq!(decision, ToolCallDecision::block("custom"));
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    // ── tool result ─────────────────────────────────────────────────

    #[tokio::test]
    async fn tool_result_chain_feeds_forward() {
        let pipeline = HookPipeline::new();
        pipeline.register_tool_result(tool_result_fn("upper", |_n: &str, r: &str| Ok(r.to_uppercase())));
        pipeline.register_tool_result(tool_result_fn("noop", |_n: &str, _r: &str| Ok(String::new())));
        pipeline.register_tool_result(tool_result_fn("wrap", |_n: &str, r: &str| Ok(format!("[{r}]"))));

        let out = pipeline
            .run_tool_result(&cancel(), "read", "abc".into())
            .await
            .unwrap();
        assert_eq!(out, "[ABC]");
    }

    // ── turn end / run ──────────────────────────────────────────────

    #[tokio::test]
    async fn turn_end_error_surfaces() {
        let pipeline = HookPipeline::new();
        pipeline.register_turn_end(turn_end_fn("ok", |_r: &str, _t: u32| Ok(())));
        pipeline.register_turn_end(turn_end_fn("fail", |_r: &str, t: u32| {
            Err(HookError::handler("fail", format!("turn {t}")))
        }));
        assert_eq!(
            pipeline.run_turn_end(&cancel(), "run-1", 3).await,
            Err(HookError::handler("fail", "turn 3"))
        );
    }

    #[tokio::test]
    async fn run_hooks_are_separate_chains() {
        let starts = Arc::new(AtomicUsize::new(0));
        let pipeline = HookPipeline::new();
        let seen = Arc::clone(&starts);
        pipeline.register_run_start(run_fn("start", move |_r: &str| {
            let _ = seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        pipeline.register_run_end(run_fn("end", |_r: &str| Err(HookError::handler("end", "x"))));

        pipeline.run_run_start(&cancel(), "run-1").await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(pipeline.run_run_end(&cancel(), "run-1").await.is_err());
        assert_eq!(
            pipeline.counts(),
            HookCounts {
                run_start: 1,
                run_end: 1,
                ..HookCounts::default()
            }
        );
    }

    // ── snapshot / timeout / cancel ─────────────────────────────────

    struct Registrar {
        pipeline: Arc<HookPipeline>,
    }

    #[async_trait]
    impl InputHook for Registrar {
        fn name(&self) -> &str {
            "registrar"
        }

        async fn on_input(&self, _text: &str) -> Result<InputOutcome, HookError> {
            self.pipeline
                .register_input(input_fn("late", |_t: &str| Ok(InputOutcome::rewrite("late"))));
            Ok(InputOutcome::unchanged())
        }
    }

    #[tokio::test]
    async fn hook_added_mid_chain_is_not_in_snapshot() {
        let pipeline = Arc::new(HookPipeline::new());
        pipeline.register_input(Arc::new(Registrar {
            pipeline: Arc::clone(&pipeline),
        }));

        let first = pipeline.run_input(&cancel(), "x").await.unwrap();
        assert_eq!(first.text, "x");
        assert_eq!(pipeline.counts().input, 2);

        let second = pipeline.run_input(&cancel(), "x").await.unwrap();
        assert_eq!(second.text, "late");
    }

    struct Sleeper;

    #[async_trait]
    impl RunHook for Sleeper {
        fn name(&self) -> &str {
            "sleeper"
        }

        async fn on_run(&self, _run_id: &str) -> Result<(), HookError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_hook_times_out() {
        let pipeline = HookPipeline::new().with_timeout(Duration::from_millis(100));
        pipeline.register_run_start(Arc::new(Sleeper));
        assert_eq!(
            pipeline.run_run_start(&cancel(), "run-1").await,
            Err(HookError::Timeout {
                name: "sleeper".into(),
                timeout_ms: 100
            })
        );
    }

    #[tokio::test]
    async fn cancelled_token_interrupts_hook() {
        let pipeline = HookPipeline::new();
        pipeline.register_run_end(Arc::new(Sleeper));
        let token = cancel();
        token.cancel();
        assert_matches!(
            pipeline.run_run_end(&token, "run-1").await,
            Err(HookError::Cancelled { name }) if name == "sleeper"
        );
    }
}
