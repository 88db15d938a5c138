//! Settings type definitions.
//!
//! JSON field names are camelCase. Every section implements [`Default`] with
//! the production values and is `#[serde(default)]`, so partial files work.

use helm_core::QueueMode;
use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HelmSettings {
    /// Settings schema version.
    pub version: String,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Turn scheduler configuration.
    pub scheduler: SchedulerSettings,
    /// Turn execution configuration.
    pub engine: EngineSettings,
    /// Hook pipeline configuration.
    pub hooks: HookSettings,
    /// Event fan-out configuration.
    pub events: EventSettings,
}

impl Default for HelmSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            logging: LoggingSettings::default(),
            scheduler: SchedulerSettings::default(),
            engine: EngineSettings::default(),
            hooks: HookSettings::default(),
            events: EventSettings::default(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit one JSON object per line instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// Turn scheduler configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSettings {
    /// Drain mode for the steer queue.
    pub steering_mode: QueueMode,
    /// Drain mode for the follow-up queue.
    pub follow_up_mode: QueueMode,
}

/// Turn execution configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Maximum provider round-trips in one turn's tool-calling loop.
    pub max_round_trips: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_round_trips: 100,
        }
    }
}

/// Hook pipeline configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookSettings {
    /// Per-invocation timeout. `None` means hooks may run as long as they like.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Event fan-out configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSettings {
    /// Capacity of the broadcast channel behind `EventBroadcaster`.
    pub capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}
