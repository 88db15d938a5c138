//! Command-loop value types.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::RuntimeError;

/// Where a turn's input came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// The prompt that started the run.
    Prompt,
    /// A steering command.
    Steer,
    /// A queued follow-up.
    FollowUp,
}

impl TurnKind {
    /// Wire name (`prompt`, `steer`, `follow_up`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Steer => "steer",
            Self::FollowUp => "follow_up",
        }
    }
}

impl fmt::Display for TurnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivered to the turn-end callback after every executed turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReport {
    /// Run the turn belonged to.
    pub run_id: String,
    /// Which command produced the turn.
    pub kind: TurnKind,
    /// Text the turn executed with.
    pub input: String,
    /// Final or partial output.
    pub output: String,
    /// Set when the turn failed or was cancelled.
    pub error: Option<RuntimeError>,
}

impl TurnReport {
    /// Whether the turn finished without error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Turn-end observer. Invoked outside every scheduler lock.
pub type TurnEndCallback = Arc<dyn Fn(&TurnReport) + Send + Sync>;
