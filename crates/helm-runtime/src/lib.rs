//! # helm-runtime
//!
//! The run core: lifecycle state machine, turn engine and command loop.
//!
//! - [`lifecycle::Runtime`]: run state plus the strictly ordered, well-nested
//!   event stream delivered to synchronous listeners
//! - [`broadcast::EventBroadcaster`]: forwards runtime events onto a
//!   `tokio::sync::broadcast` channel
//! - [`engine::Engine`]: executes one turn (provider round-trips, sequential
//!   tool calls, hook chains) and brackets multi-turn runs
//! - [`scheduler::CommandLoop`]: accepts prompt / steer / follow-up / abort
//!   and runs a run's turns on one background task
//!
//! ## Ordering
//!
//! Steers always execute before follow-ups within a run. Events for one run
//! are emitted in call order; listeners never see two events concurrently.
//! Every scope the engine opens is closed on every exit path, including
//! cancellation and a dropped turn future.
//!
//! ## Crate Position
//!
//! Depends on helm-core, helm-llm, helm-tools, helm-hooks.
//! Depended on by helm-agent.

#![deny(unsafe_code)]

pub mod broadcast;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod lifecycle;
pub mod scheduler;

pub use broadcast::EventBroadcaster;
pub use engine::{DEFAULT_MAX_ROUND_TRIPS, Engine};
pub use errors::{CommandError, LifecycleError, RuntimeError};
pub use executor::{ExecutionResult, RunCoordinator, TurnExecutor};
pub use lifecycle::{Listener, RunState, Runtime, Subscription};
pub use scheduler::{CommandLoop, TurnEndCallback, TurnKind, TurnReport};
