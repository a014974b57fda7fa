//! JSON protocol spoken over the daemon socket
//!
//! One request and one response per connection, each a single JSON object
//! terminated by a newline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::DaemonError;
use crate::types::SessionId;

/// Request from client to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonRequest {
    /// Action name, see [`Action`]
    pub action: String,

    /// Target session, required by every session-scoped action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Action-specific payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl DaemonRequest {
    /// Build a request
    pub fn new(action: Action, session_id: Option<SessionId>, payload: Option<serde_json::Value>) -> Self {
        Self {
            action: action.as_str().to_string(),
            session_id,
            payload,
        }
    }

    /// Build a request carrying a serializable payload
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized
    pub fn with_payload<T: Serialize>(
        action: Action,
        session_id: SessionId,
        payload: &T,
    ) -> Result<Self, DaemonError> {
        Ok(Self::new(
            action,
            Some(session_id),
            Some(serde_json::to_value(payload)?),
        ))
    }
}

/// Actions understood by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Liveness probe
    Ping,
    /// Start an actor for an existing remote session (idempotent)
    StartSession,
    /// Create a remote session and start its actor
    CreateSession,
    /// Read a session snapshot
    GetStatus,
    /// Queue a message
    Prompt,
    /// Queue a slash command
    Command,
    /// Queue an answer to an open question
    Answer,
    /// Queue abort-and-continue recovery
    Fix,
    /// Queue an abort
    Abort,
}

impl Action {
    /// Wire name of the action
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::StartSession => "START_SESSION",
            Self::CreateSession => "CREATE_SESSION",
            Self::GetStatus => "GET_STATUS",
            Self::Prompt => "PROMPT",
            Self::Command => "COMMAND",
            Self::Answer => "ANSWER",
            Self::Fix => "FIX",
            Self::Abort => "ABORT",
        }
    }
}

impl FromStr for Action {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PING" => Ok(Self::Ping),
            "START_SESSION" => Ok(Self::StartSession),
            "CREATE_SESSION" => Ok(Self::CreateSession),
            "GET_STATUS" => Ok(Self::GetStatus),
            "PROMPT" => Ok(Self::Prompt),
            "COMMAND" => Ok(Self::Command),
            "ANSWER" => Ok(Self::Answer),
            "FIX" => Ok(Self::Fix),
            "ABORT" => Ok(Self::Abort),
            other => Err(DaemonError::unknown_action(other)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome marker of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Request handled
    Ok,
    /// Request failed, see `code` and `message`
    Error,
}

/// Response from daemon to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonResponse {
    /// `ok` or `error`
    pub status: ResponseStatus,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Stable error code, present on errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Action-specific data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl DaemonResponse {
    /// Success with a message
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: Some(message.into()),
            code: None,
            data: None,
        }
    }

    /// Success carrying data
    #[must_use]
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: None,
            code: None,
            data: Some(data),
        }
    }

    /// Error with an explicit code
    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            code: Some(code.into()),
            data: None,
        }
    }

    /// True if `status` is `ok`
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// Turn an error response back into a [`DaemonError`]
    ///
    /// # Errors
    /// Returns the error the response describes
    pub fn into_result(self) -> Result<Self, DaemonError> {
        if self.is_ok() {
            return Ok(self);
        }
        let message = self.message.unwrap_or_default();
        Err(match self.code.as_deref() {
            Some("SESSION_NOT_FOUND") => DaemonError::SessionNotFound(message),
            Some("SESSION_BUSY") => DaemonError::SessionBusy(message),
            Some("UNKNOWN_ACTION") => DaemonError::UnknownAction(message),
            Some("MALFORMED_REQUEST") => DaemonError::MalformedRequest(message),
            Some("REMOTE_CALL_FAILED") => DaemonError::RemoteCallFailed(message),
            Some("TIMEOUT") => DaemonError::Timeout(message),
            _ => DaemonError::Internal(message),
        })
    }
}

impl From<DaemonError> for DaemonResponse {
    fn from(error: DaemonError) -> Self {
        Self::error(error.to_string(), error.code())
    }
}

/// Payload of START_SESSION
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartSessionPayload {
    /// Project directory the session's remote calls are scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

/// Payload of CREATE_SESSION
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionPayload {
    /// Title of the new remote session
    #[serde(default)]
    pub title: String,

    /// Project directory the session's remote calls are scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

/// Texts a client may PROMPT while the session is busy
const INTERRUPT_SAFE: &[&str] = &["continue", "abort", "retry", "start-work"];

/// True if `text` may be queued while a worker is running
///
/// Comparison ignores surrounding whitespace, case and one leading `/`.
#[must_use]
pub fn is_interrupt_safe(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    let word = normalized.strip_prefix('/').unwrap_or(&normalized);
    INTERRUPT_SAFE.contains(&word)
}
