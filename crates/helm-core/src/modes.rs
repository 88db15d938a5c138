//! Queue drain modes for steer and follow-up queues.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a queue is drained when the scheduler picks its next turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueMode {
    /// Each queued item becomes its own turn.
    #[default]
    #[serde(rename = "sequential")]
    Sequential,
    /// All queued items are joined with `\n` into a single turn.
    #[serde(rename = "batch-all")]
    BatchAll,
}

impl QueueMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::BatchAll => "batch-all",
        }
    }
}

impl fmt::Display for QueueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected queue mode string.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid queue mode: {0:?} (expected \"sequential\" or \"batch-all\")")]
pub struct ParseQueueModeError(pub String);

impl FromStr for QueueMode {
    type Err = ParseQueueModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "batch-all" => Ok(Self::BatchAll),
            other => Err(ParseQueueModeError(other.to_owned())),
        }
    }
}
