use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Identifier of one end-to-end task execution.
///
/// Task ids are supplied by the external caller (the control channel hands
/// them out); `generate` exists for interactive callers that do not keep
/// their own id space.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Millisecond timestamp plus a random six digit suffix.
    pub fn generate() -> Self {
        let suffix = 100_000 + rand::random::<u32>() % 900_000;
        Self(format!("{}-{}", Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Actors appearing in execution events.
///
/// `Manager` is a virtual actor representing the engine itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Manager,
    Planner,
    Navigator,
    User,
}

impl Actor {
    pub fn as_str(self) -> &'static str {
        match self {
            Actor::Manager => "manager",
            Actor::Planner => "planner",
            Actor::Navigator => "navigator",
            Actor::User => "user",
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human readable UTC timestamp used on execution events.
pub fn current_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
