//! Open-scope tracking for one engine turn.
//!
//! [`TurnScope`] remembers which message / tool / turn / run scopes the
//! engine has opened on the runtime. Closing happens explicitly on the normal
//! path; if the turn future is dropped mid-flight, `Drop` closes whatever is
//! still open so the runtime never stays stuck in a run.

use helm_core::{MessageId, Role};
use tracing::warn;

use crate::errors::LifecycleError;
use crate::lifecycle::{RunState, Runtime};

pub(crate) struct TurnScope<'a> {
    runtime: &'a Runtime,
    message: Option<MessageId>,
    tool: Option<(String, String)>,
    turn_open: bool,
    owns_run: bool,
}

impl<'a> TurnScope<'a> {
    /// `owns_run` is true when this turn opened the run itself and must end it.
    pub(crate) fn new(runtime: &'a Runtime, owns_run: bool) -> Self {
        Self {
            runtime,
            message: None,
            tool: None,
            turn_open: false,
            owns_run,
        }
    }

    pub(crate) fn start_turn(&mut self) -> Result<u32, LifecycleError> {
        let turn = self.runtime.start_turn()?;
        self.turn_open = true;
        Ok(turn)
    }

    /// Open a message and keep it open until [`close_message`](Self::close_message).
    pub(crate) fn open_message(&mut self, role: Role) -> Result<MessageId, LifecycleError> {
        let id = MessageId::new();
        self.runtime.message_start(id.as_str(), role)?;
        self.message = Some(id.clone());
        Ok(id)
    }

    pub(crate) fn close_message(&mut self) -> Result<(), LifecycleError> {
        if let Some(id) = self.message.take() {
            self.runtime.message_end(id.as_str())?;
        }
        Ok(())
    }

    pub(crate) fn open_tool(&mut self, tool_call_id: &str, tool_name: &str) -> Result<(), LifecycleError> {
        self.runtime.tool_execution_start(tool_call_id, tool_name)?;
        self.tool = Some((tool_call_id.to_owned(), tool_name.to_owned()));
        Ok(())
    }

    pub(crate) fn close_tool(&mut self) -> Result<(), LifecycleError> {
        if let Some((id, name)) = self.tool.take() {
            self.runtime.tool_execution_end(&id, &name)?;
        }
        Ok(())
    }

    /// Move the runtime to `aborting` if it is still running.
    pub(crate) fn mark_aborting(&self) {
        if self.runtime.state() != RunState::Running {
            return;
        }
        if let Err(e) = self.runtime.abort_run() {
            warn!(error = %e, "abort transition rejected");
        }
    }

    /// Close any open tool and message scopes, innermost first.
    pub(crate) fn close_open(&mut self) {
        if let Err(e) = self.close_tool() {
            warn!(error = %e, "failed to close tool scope");
        }
        if let Err(e) = self.close_message() {
            warn!(error = %e, "failed to close message scope");
        }
    }

    pub(crate) fn end_turn(&mut self) {
        if !self.turn_open {
            return;
        }
        self.turn_open = false;
        if let Err(e) = self.runtime.end_turn() {
            warn!(error = %e, "failed to end turn");
        }
    }

    pub(crate) fn owns_run(&self) -> bool {
        self.owns_run
    }

    pub(crate) fn end_run(&mut self) {
        if !self.owns_run {
            return;
        }
        self.owns_run = false;
        if let Err(e) = self.runtime.end_run() {
            warn!(error = %e, "failed to end run");
        }
    }
}

impl Drop for TurnScope<'_> {
    fn drop(&mut self) {
        self.close_open();
        self.end_turn();
        self.end_run();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn recorded(runtime: &Runtime) -> Arc<Mutex<Vec<&'static str>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = runtime.subscribe(move |e| sink.lock().push(e.type_name()));
        seen
    }

    #[test]
    fn drop_closes_everything_still_open() {
        let runtime = Runtime::new();
        runtime.start_run("r").unwrap();
        let seen = recorded(&runtime);
        {
            let mut scope = TurnScope::new(&runtime, true);
            let _ = scope.start_turn().unwrap();
            let _ = scope.open_message(Role::Assistant).unwrap();
            scope.open_tool("tc", "read").unwrap();
        }
        assert_eq!(
            *seen.lock(),
            vec![
                "turn_start",
                "message_start",
                "tool_execution_start",
                "tool_execution_end",
                "message_end",
                "turn_end",
                "agent_end",
            ]
        );
        assert_eq!(runtime.state(), RunState::Idle);
    }

    #[test]
    fn borrowed_run_is_left_open() {
        let runtime = Runtime::new();
        runtime.start_run("r").unwrap();
        {
            let mut scope = TurnScope::new(&runtime, false);
            let _ = scope.start_turn().unwrap();
            scope.mark_aborting();
        }
        assert_eq!(runtime.state(), RunState::Aborting);
        assert_eq!(runtime.current_run_id(), "r");
    }

    #[test]
    fn explicit_close_is_not_repeated_on_drop() {
        let runtime = Runtime::new();
        runtime.start_run("r").unwrap();
        let seen = recorded(&runtime);
        {
            let mut scope = TurnScope::new(&runtime, true);
            let _ = scope.start_turn().unwrap();
            let _ = scope.open_message(Role::User).unwrap();
            scope.close_message().unwrap();
            scope.end_turn();
            scope.end_run();
        }
        assert_eq!(
            *seen.lock(),
            vec!["turn_start", "message_start", "message_end", "turn_end", "agent_end"]
        );
    }
}
