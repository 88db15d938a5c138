//! Branded ID newtypes.
//!
//! Message ids are UUID v7 (time-ordered) generated via [`uuid::Uuid::now_v7`].
//! Run ids are not generated here: the scheduler formats them from its own
//! monotonic counter.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a message opened by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new time-ordered id.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", Uuid::now_v7().simple()))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
