//! `tracing` subscriber setup.
//!
//! All helm crates log through `tracing`. Run context (run id, turn, tool
//! name) travels as span fields set by `#[instrument]` on the engine turn and
//! the scheduler run task, so every line a hook or tool logs inside a turn is
//! attributable to its run.
//!
//! `RUST_LOG` takes precedence over the level passed in.

pub mod capture;

pub use capture::{CapturedLine, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global subscriber with compact human-readable stderr output.
///
/// Call once at startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails only if a global default is already set
    let _ = subscriber.try_init();
}

/// Initialize the global subscriber with one JSON object per line on stderr.
///
/// Call once at startup. Subsequent calls are no-ops.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .json()
        .with_current_span(true);

    let _ = subscriber.try_init();
}
