//! # helm-core
//!
//! Foundation types shared by every Helm crate:
//!
//! - **Events**: [`events::Event`] and [`events::EventType`], the immutable
//!   lifecycle notifications emitted by the runtime
//! - **Messages**: [`messages::Message`] and [`messages::Role`]
//! - **IDs**: [`ids::MessageId`] (UUID v7)
//! - **Queue modes**: [`modes::QueueMode`] for steer / follow-up draining
//! - **Logging**: [`logging::init_subscriber`] and the log-capture test utility
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other helm crates.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod modes;

pub use events::{Event, EventType};
pub use ids::MessageId;
pub use messages::{Message, Role};
pub use modes::{ParseQueueModeError, QueueMode};
