//! # helm-tools
//!
//! Tool contract consumed by the engine:
//!
//! - [`traits::Tool`]: a named, cancellable operation returning result text
//! - [`traits::ToolContext`]: per-call context with the cancellation token
//! - [`registry::ToolRegistry`]: name → implementation index
//!
//! Concrete tools (shell, file access, search) live outside this workspace.
//!
//! ## Crate Position
//!
//! Standalone. Depended on by helm-runtime.

#![deny(unsafe_code)]

pub mod errors;
pub mod registry;
pub mod traits;

pub use errors::ToolError;
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolContext};
