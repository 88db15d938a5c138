//! # helm-llm
//!
//! Provider stream contract consumed by the engine:
//!
//! - [`provider::Provider`]: one streaming round-trip per call, cancellable
//!   through a [`tokio_util::sync::CancellationToken`]
//! - [`provider::ProviderRequest`] / [`provider::ProviderEvent`]: the wire
//!   shapes exchanged with a provider
//! - [`mock::ScriptedProvider`]: pre-programmed responses for tests
//! - [`echo::EchoProvider`]: replies with the latest user text, used by the CLI
//!
//! HTTP adapters and retry policy live outside this workspace.
//!
//! ## Crate Position
//!
//! Depends on helm-core. Depended on by helm-runtime and helm-agent.

#![deny(unsafe_code)]

pub mod echo;
pub mod mock;
pub mod provider;

pub use echo::EchoProvider;
pub use mock::{MockResponse, ScriptedProvider};
pub use provider::{
    Provider, ProviderError, ProviderEvent, ProviderEventStream, ProviderMessage, ProviderRequest,
    ProviderResult, StopReason, TokenUsage, ToolResultEntry,
};
