use thiserror::Error;
use webpilot_core_types::TaskId;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A second run was attempted while a task is bound. Never queued.
    #[error("another task is currently running, please wait for it to complete: {0}")]
    AlreadyRunning(TaskId),

    /// The execution context's cancellation token fired.
    #[error("task cancelled")]
    Cancelled,

    /// The decision service failed or returned unusable output.
    #[error("decision service failure: {0}")]
    Decision(String),

    /// A browser/page operation failed.
    #[error("browser failure: {0}")]
    Browser(String),

    /// Malformed input to an engine or tool entry point.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Writing a task or transcript document failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The event bus rejected an emit.
    #[error("event bus failure: {0}")]
    Bus(String),
}

impl AgentError {
    pub fn decision(message: impl Into<String>) -> Self {
        Self::Decision(message.into())
    }

    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<webpilot_event_bus::BusError> for AgentError {
    fn from(err: webpilot_event_bus::BusError) -> Self {
        Self::Bus(err.to_string())
    }
}
