//! Task identifiers.
//!
//! Tasks are identified either by a caller-supplied name (e.g. `batch_3_0`) or
//! by a generated UUID, so the id wraps a string rather than a bare `Uuid`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a new random task ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use a caller-chosen name as the task ID.
    #[must_use]
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl From<&str> for TaskId {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for TaskId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
