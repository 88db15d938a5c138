//! Command-loop scheduling, abort and coordination scenarios.

mod support;

use std::collections::HashSet;
use std::sync::Arc;

use assert_matches::assert_matches;
use helm_core::QueueMode;
use helm_llm::{MockResponse, ScriptedProvider};
use helm_runtime::{
    CommandError, CommandLoop, Engine, RunState, Runtime, RuntimeError, TurnKind, TurnReport,
};
use helm_tools::ToolRegistry;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

use support::{PanickingTool, RecordingExecutor, assert_well_nested, names, record};

fn reports(commands: &CommandLoop) -> Arc<Mutex<Vec<TurnReport>>> {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    commands.set_on_turn_end(move |r| sink.lock().push(r.clone()));
    reports
}

fn gated() -> (Arc<RecordingExecutor>, Arc<Notify>, CommandLoop) {
    let gate = Arc::new(Notify::new());
    let executor = Arc::new(RecordingExecutor::gated(Arc::clone(&gate)));
    let commands = CommandLoop::new(executor.clone());
    (executor, gate, commands)
}

#[tokio::test]
async fn steers_preempt_follow_ups() {
    let (executor, gate, commands) = gated();
    let reports = reports(&commands);

    let run_id = commands.prompt("p0").unwrap();
    assert_eq!(commands.state(), RunState::Running);
    assert_eq!(commands.current_run_id().as_deref(), Some(run_id.as_str()));
    commands.follow_up("f1").unwrap();
    commands.steer("s1").unwrap();
    commands.follow_up("f2").unwrap();
    commands.steer("s2").unwrap();
    assert_eq!(commands.pending(), (2, 2));
    gate.notify_one();
    commands.wait_until_idle().await;

    assert_eq!(executor.texts(), vec!["p0", "s1", "s2", "f1", "f2"]);
    let reports = reports.lock();
    let kinds: Vec<_> = reports.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TurnKind::Prompt,
            TurnKind::Steer,
            TurnKind::Steer,
            TurnKind::FollowUp,
            TurnKind::FollowUp,
        ]
    );
    assert!(reports.iter().all(|r| r.run_id == run_id && r.is_ok()));
    assert_eq!(reports[1].output, "done: s1");
    assert_eq!(commands.state(), RunState::Idle);
    assert_eq!(commands.current_run_id(), None);
}

#[tokio::test]
async fn batch_mode_coalesces_steers() {
    let (executor, gate, commands) = gated();
    commands.set_steering_mode(QueueMode::BatchAll);

    let _ = commands.prompt("p0").unwrap();
    commands.steer("s1").unwrap();
    commands.steer("s2").unwrap();
    commands.follow_up("f1").unwrap();
    gate.notify_one();
    commands.wait_until_idle().await;

    assert_eq!(executor.texts(), vec!["p0", "s1\ns2", "f1"]);
}

#[tokio::test]
async fn abort_drops_queued_turns() {
    let (executor, _gate, commands) = gated();
    let reports = reports(&commands);

    let _ = commands.prompt("p0").unwrap();
    commands.steer("s1").unwrap();
    commands.follow_up("f1").unwrap();
    executor.started.notified().await;

    commands.abort().unwrap();
    assert_eq!(commands.state(), RunState::Aborting);
    assert_eq!(commands.pending(), (0, 0));
    assert_matches!(commands.abort(), Err(CommandError::NoActiveRun));
    assert_matches!(commands.steer("late"), Err(CommandError::NoActiveRun));
    commands.wait_until_idle().await;

    assert_eq!(executor.texts(), vec!["p0"]);
    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].error, Some(RuntimeError::Cancelled));
    assert_eq!(reports[0].output, "partial");
    assert_eq!(commands.state(), RunState::Idle);
    assert_matches!(commands.abort(), Err(CommandError::NoActiveRun));
}

#[tokio::test]
async fn coordinator_brackets_the_whole_run() {
    let gate = Arc::new(Notify::new());
    let executor = Arc::new(RecordingExecutor {
        coordinate: true,
        ..RecordingExecutor::gated(Arc::clone(&gate))
    });
    let commands = CommandLoop::new(executor.clone());

    let run_id = commands.prompt("p0").unwrap();
    commands.steer("s1").unwrap();
    commands.follow_up("f1").unwrap();
    gate.notify_one();
    commands.wait_until_idle().await;

    assert_eq!(executor.texts().len(), 3);
    assert_eq!(*executor.begins.lock(), vec![run_id.clone()]);
    assert_eq!(*executor.ends.lock(), vec![run_id]);
}

#[tokio::test]
async fn begin_failure_reports_and_returns_to_idle() {
    let executor = Arc::new(RecordingExecutor {
        coordinate: true,
        fail_begin: true,
        ..RecordingExecutor::default()
    });
    let commands = CommandLoop::new(executor.clone());
    let reports = reports(&commands);

    let run_id = commands.prompt("p0").unwrap();
    commands.wait_until_idle().await;

    assert!(executor.texts().is_empty());
    assert!(executor.ends.lock().is_empty());
    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].run_id, run_id);
    assert_eq!(reports[0].input, "p0");
    assert_matches!(reports[0].error, Some(RuntimeError::Coordination(_)));
    assert_eq!(commands.state(), RunState::Idle);
}

#[tokio::test]
async fn commands_during_end_run_are_rejected_not_queued() {
    let end_gate = Arc::new(Notify::new());
    let executor = Arc::new(RecordingExecutor {
        coordinate: true,
        end_gate: Some(Arc::clone(&end_gate)),
        ..RecordingExecutor::default()
    });
    let commands = CommandLoop::new(executor.clone());

    let run_id = commands.prompt("p0").unwrap();
    executor.ending.notified().await;

    assert_eq!(commands.state(), RunState::Running);
    assert_eq!(commands.current_run_id().as_deref(), Some(run_id.as_str()));
    assert_matches!(commands.steer("late"), Err(CommandError::NoActiveRun));
    assert_matches!(commands.follow_up("later"), Err(CommandError::NoActiveRun));
    assert_eq!(commands.pending(), (0, 0));

    end_gate.notify_one();
    commands.wait_until_idle().await;
    assert_eq!(executor.texts(), vec!["p0"]);
    assert_eq!(*executor.ends.lock(), vec![run_id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commands_lose_nothing() {
    let (executor, gate, commands) = gated();
    let _ = commands.prompt("p0").unwrap();

    let mut tasks = Vec::new();
    for t in 0..8 {
        let commands = commands.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..5 {
                commands.steer(&format!("s-{t}-{i}")).unwrap();
                commands.follow_up(&format!("f-{t}-{i}")).unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(commands.pending(), (40, 40));
    gate.notify_one();
    commands.wait_until_idle().await;

    let texts = executor.texts();
    assert_eq!(texts.len(), 81);
    assert_eq!(texts[0], "p0");
    let first_follow_up = texts.iter().position(|t| t.starts_with("f-")).unwrap();
    assert!(texts[1..first_follow_up].iter().all(|t| t.starts_with("s-")));
    assert!(texts[first_follow_up..].iter().all(|t| t.starts_with("f-")));

    let unique: HashSet<_> = texts.iter().collect();
    assert_eq!(unique.len(), 81);
    for t in 0..8 {
        let mine: Vec<_> = texts
            .iter()
            .filter(|s| s.starts_with(&format!("s-{t}-")))
            .cloned()
            .collect();
        let expected: Vec<_> = (0..5).map(|i| format!("s-{t}-{i}")).collect();
        assert_eq!(mine, expected);
    }
}

#[tokio::test]
async fn state_watch_follows_the_run() {
    let (_executor, gate, commands) = gated();
    let mut rx = commands.subscribe_state();
    assert_eq!(*rx.borrow_and_update(), RunState::Idle);

    let _ = commands.prompt("p0").unwrap();
    assert_eq!(*rx.borrow_and_update(), RunState::Running);
    gate.notify_one();
    let _ = rx.wait_for(|s| *s == RunState::Idle).await.unwrap();
    assert_eq!(commands.state(), RunState::Idle);
}

#[tokio::test]
async fn engine_run_emits_one_agent_scope() {
    let runtime = Arc::new(Runtime::new());
    let provider = Arc::new(ScriptedProvider::new(vec![
        MockResponse::text("first"),
        MockResponse::text("second"),
    ]));
    let engine = Arc::new(Engine::new(Arc::clone(&runtime), provider));
    let events = record(&runtime);
    let commands = CommandLoop::new(engine);
    let reports = reports(&commands);

    let run_id = commands.prompt("hello").unwrap();
    commands.follow_up("again").unwrap();
    commands.wait_until_idle().await;

    let outputs: Vec<_> = reports.lock().iter().map(|r| r.output.clone()).collect();
    assert_eq!(outputs, vec!["first", "second"]);

    let events = events.lock();
    assert!(events.iter().all(|e| e.run_id == run_id));
    let kinds = names(&events);
    assert_eq!(kinds.first(), Some(&"agent_start"));
    assert_eq!(kinds.last(), Some(&"agent_end"));
    assert_eq!(kinds.iter().filter(|k| **k == "turn_start").count(), 2);
    assert_well_nested(&events);
    assert_eq!(runtime.state(), RunState::Idle);
}

#[tokio::test]
async fn panicking_tool_does_not_leak_the_engine_run() {
    let runtime = Arc::new(Runtime::new());
    let provider = Arc::new(ScriptedProvider::new(vec![
        MockResponse::tool_calls(&[("tc-1", "explode", json!({}))]),
        MockResponse::text("recovered"),
    ]));
    let engine = Arc::new(Engine::new(Arc::clone(&runtime), provider));
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(PanickingTool));
    engine.set_tools(tools);
    let events = record(&runtime);
    let commands = CommandLoop::new(engine);
    let reports = reports(&commands);

    let first = commands.prompt("p0").unwrap();
    commands.wait_until_idle().await;
    assert_eq!(runtime.state(), RunState::Idle);
    assert_eq!(runtime.current_run_id(), "");

    let second = commands.prompt("p1").unwrap();
    commands.wait_until_idle().await;

    let reports = reports.lock();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].run_id, first);
    assert_matches!(
        &reports[0].error,
        Some(RuntimeError::Internal(msg)) if msg.contains("tool exploded")
    );
    assert_eq!(reports[1].run_id, second);
    assert_eq!(reports[1].output, "recovered");
    assert!(reports[1].is_ok());

    let events = events.lock();
    assert_well_nested(&events);
    let kinds = names(&events);
    assert_eq!(kinds.iter().filter(|k| **k == "agent_end").count(), 2);
    assert_eq!(runtime.state(), RunState::Idle);
}
