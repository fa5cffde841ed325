use thiserror::Error;

/// Errors emitted by the browser-session crate.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Launching an owned browser failed.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// Attaching to a remote-debugging endpoint failed.
    #[error("failed to attach to browser over the debugging protocol: {0}")]
    Attach(String),

    /// Spawning the external browser process failed.
    #[error("failed to spawn external browser: {0}")]
    Spawn(String),

    /// An operation was attempted before `acquire` succeeded.
    #[error("browser session is not initialized")]
    NotInitialized,

    /// A page-level operation failed.
    #[error("page operation failed: {0}")]
    Page(String),
}

impl SessionError {
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch(message.into())
    }

    pub fn attach(message: impl Into<String>) -> Self {
        Self::Attach(message.into())
    }

    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn(message.into())
    }

    pub fn page(message: impl Into<String>) -> Self {
        Self::Page(message.into())
    }
}

impl From<chromiumoxide::error::CdpError> for SessionError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        SessionError::Page(err.to_string())
    }
}
