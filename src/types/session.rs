//! Session status types reported through GET_STATUS

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifiers::SessionId;
use super::question::Question;

/// Session state as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No worker running, no open questions
    Idle,
    /// A worker is running and nothing is waiting on the user
    Busy,
    /// At least one question is open for this session
    WaitingForInput,
}

impl SessionState {
    /// Wire name of the state
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Busy => "BUSY",
            Self::WaitingForInput => "WAITING_FOR_INPUT",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent worker: exactly one of `result`/`error` is meaningful
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestResponse {
    /// Decoded response body on success
    pub result: serde_json::Value,
    /// Error string on failure
    pub error: Option<String>,
}

impl LatestResponse {
    /// Successful outcome
    #[must_use]
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            result,
            error: None,
        }
    }

    /// Failed outcome
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            result: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    /// True when the outcome is an error
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Point-in-time view of one session actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current state
    pub state: SessionState,
    /// Session the snapshot describes
    pub session_id: SessionId,
    /// Last completed worker outcome, cleared on dispatch
    pub latest_response: Option<LatestResponse>,
    /// Open questions attributed to this session
    pub questions: Vec<Question>,
    /// Commands accepted by the daemon but not yet applied by the actor
    #[serde(default)]
    pub queued: usize,
    /// Wall-clock time of the last state change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// Snapshot of a freshly started, idle session
    #[must_use]
    pub fn idle(session_id: SessionId) -> Self {
        Self {
            state: SessionState::Idle,
            session_id,
            latest_response: None,
            questions: Vec::new(),
            queued: 0,
            last_activity: None,
        }
    }

    /// True once the session has nothing in flight and nothing queued
    ///
    /// A session waiting on questions also counts as settled: the client has
    /// to answer before anything else happens.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        match self.state {
            SessionState::WaitingForInput => true,
            SessionState::Idle => self.queued == 0,
            SessionState::Busy => false,
        }
    }
}
