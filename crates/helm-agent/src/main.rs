//! # helm-agent
//!
//! Command-line driver for the Helm run core. `helm-agent run` starts one
//! scheduler run against the echo provider, queues any steers and follow-ups
//! given on the command line, prints every lifecycle event as a JSON line on
//! stdout, then one JSON line per turn report.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use helm_core::logging::{init_json_subscriber, init_subscriber};
use helm_core::{Event, QueueMode};
use helm_hooks::HookPipeline;
use helm_llm::EchoProvider;
use helm_runtime::{CommandLoop, Engine, EventBroadcaster, Runtime, TurnReport};
use helm_settings::{HelmSettings, get_settings, init_settings, load_settings, load_settings_from_path};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Helm run-core driver.
#[derive(Parser, Debug)]
#[command(name = "helm-agent", about = "Drive the Helm run core from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (defaults to `~/.helm/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level or filter directive (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a prompt, then every queued steer and follow-up.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Prompt text for the first turn.
    prompt: String,

    /// Steering text, queued while the prompt turn runs (repeatable).
    #[arg(long = "steer")]
    steers: Vec<String>,

    /// Follow-up text, queued while the prompt turn runs (repeatable).
    #[arg(long = "follow-up")]
    follow_ups: Vec<String>,

    /// `sequential` or `batch-all` (overrides settings).
    #[arg(long)]
    steering_mode: Option<QueueMode>,

    /// `sequential` or `batch-all` (overrides settings).
    #[arg(long)]
    follow_up_mode: Option<QueueMode>,

    /// Delay between echoed chunks, in milliseconds.
    #[arg(long, default_value_t = 0)]
    chunk_delay_ms: u64,
}

fn resolve_settings(cli: &Cli) -> Result<HelmSettings> {
    let mut settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => load_settings().context("failed to load settings")?,
    };
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    if cli.json_logs {
        settings.logging.json = true;
    }
    Ok(settings)
}

fn report_json(report: &TurnReport) -> Value {
    json!({
        "type": "turn_report",
        "runId": report.run_id,
        "kind": report.kind,
        "input": report.input,
        "output": report.output,
        "error": report.error.as_ref().map(|e| json!({
            "code": e.category(),
            "message": e.to_string(),
        })),
    })
}

async fn print_events(mut rx: broadcast::Receiver<Event>) -> Result<u64> {
    let mut printed = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                println!("{}", serde_json::to_string(&event)?);
                printed += 1;
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
            Err(RecvError::Closed) => return Ok(printed),
        }
    }
}

async fn run(settings: &HelmSettings, args: RunArgs) -> Result<()> {
    let runtime = Arc::new(Runtime::new());
    let broadcaster = EventBroadcaster::with_capacity(&runtime, settings.events.capacity);
    let printer = tokio::spawn(print_events(broadcaster.subscribe()));

    let mut hooks = HookPipeline::new();
    if let Some(ms) = settings.hooks.timeout_ms {
        hooks = hooks.with_timeout(Duration::from_millis(ms));
    }
    let provider = EchoProvider::new().with_chunk_delay(Duration::from_millis(args.chunk_delay_ms));
    let engine = Engine::new(Arc::clone(&runtime), Arc::new(provider))
        .with_max_round_trips(settings.engine.max_round_trips);
    engine.set_hooks(Arc::new(hooks));

    let commands = CommandLoop::new(Arc::new(engine));
    commands.set_steering_mode(args.steering_mode.unwrap_or(settings.scheduler.steering_mode));
    commands.set_follow_up_mode(args.follow_up_mode.unwrap_or(settings.scheduler.follow_up_mode));

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    commands.set_on_turn_end(move |report| sink.lock().push(report.clone()));

    let run_id = commands.prompt(&args.prompt).context("prompt rejected")?;
    info!(%run_id, steers = args.steers.len(), follow_ups = args.follow_ups.len(), "run submitted");
    for text in &args.steers {
        commands.steer(text).context("steer rejected")?;
    }
    for text in &args.follow_ups {
        commands.follow_up(text).context("follow-up rejected")?;
    }
    commands.wait_until_idle().await;

    let emitted = broadcaster.emit_count();
    broadcaster.detach();
    drop(broadcaster);
    let printed = printer.await.context("event printer panicked")??;
    debug!(printed, emitted, "events flushed");

    let reports = std::mem::take(&mut *reports.lock());
    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    for report in &reports {
        println!("{}", report_json(report));
    }
    if failed > 0 {
        bail!("{failed} of {} turn(s) failed", reports.len());
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;
    if settings.logging.json {
        init_json_subscriber(&settings.logging.level);
    } else {
        init_subscriber(&settings.logging.level);
    }
    if init_settings(settings).is_err() {
        warn!("settings already initialized");
    }
    let settings = get_settings();

    match cli.command {
        Command::Run(args) => run(settings, args).await,
    }
}
