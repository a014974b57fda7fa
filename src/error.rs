//! Error types for the OpenCode session daemon

use thiserror::Error;

/// Main error type for the daemon, its actors and its client
#[derive(Error, Debug)]
pub enum DaemonError {
    /// The daemon socket could not be reached
    #[error("Daemon not reachable: {0}")]
    ConnectionRefused(String),

    /// No actor exists for the session id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A PROMPT was rejected because the session is processing another request
    #[error(
        "Session {0} is busy processing another request. Wait for the previous result before sending a new message."
    )]
    SessionBusy(String),

    /// The request named an action the daemon does not implement
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// The request (or its payload) could not be decoded
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// An outbound call to the agent service failed
    #[error("Remote call failed: {0}")]
    RemoteCallFailed(String),

    /// Posting an answer to an interactive question failed
    #[error("Answer failed: {0}")]
    AnswerFailed(String),

    /// Polling the agent service for open questions failed
    #[error("Question poll failed: {0}")]
    PollFailed(String),

    /// Another daemon already owns the socket
    #[error("Daemon already running: {0}")]
    DaemonRunning(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected failure inside the daemon
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

impl DaemonError {
    /// Stable wire code reported in IPC error responses
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionRefused(_) => "CONNECTION_REFUSED",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionBusy(_) => "SESSION_BUSY",
            Self::UnknownAction(_) => "UNKNOWN_ACTION",
            Self::MalformedRequest(_) | Self::Json(_) => "MALFORMED_REQUEST",
            Self::RemoteCallFailed(_) => "REMOTE_CALL_FAILED",
            Self::AnswerFailed(_) => "ANSWER_FAILED",
            Self::PollFailed(_) => "POLL_FAILED",
            Self::DaemonRunning(_) => "DAEMON_RUNNING",
            Self::Timeout(_) => "TIMEOUT",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create a connection refused error
    pub fn connection_refused(msg: impl Into<String>) -> Self {
        Self::ConnectionRefused(msg.into())
    }

    /// Create a session not found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound(session_id.into())
    }

    /// Create a session busy error
    pub fn session_busy(session_id: impl Into<String>) -> Self {
        Self::SessionBusy(session_id.into())
    }

    /// Create an unknown action error
    pub fn unknown_action(action: impl Into<String>) -> Self {
        Self::UnknownAction(action.into())
    }

    /// Create a malformed request error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    /// Create a remote call error
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteCallFailed(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<reqwest::Error> for DaemonError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::RemoteCallFailed(err.to_string())
        }
    }
}
