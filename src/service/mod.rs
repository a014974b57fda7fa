//! Agent service boundary
//!
//! This module defines the calls the daemon makes against the remote agent
//! service and the HTTP implementation used in production. Session actors
//! are generic over [`AgentService`] so tests can drive them with an
//! in-memory service.

mod http;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{AnswerRequest, CommandRequest, PromptRequest, Question, SessionId};

pub use http::HttpAgentService;

/// Remote operations consumed by the daemon
///
/// Every call is scoped to a project directory, sent to the service as the
/// directory-scoping header. Implementations must be cheap to share across
/// tasks; actors hold them in an `Arc`.
pub trait AgentService: Send + Sync + 'static {
    /// Create a remote session and return its id
    ///
    /// # Errors
    /// Returns error if the service rejects the request or is unreachable
    fn create_session(
        &self,
        directory: &Path,
        title: &str,
    ) -> impl Future<Output = Result<SessionId>> + Send;

    /// Post a message to a session and wait for the run to finish
    ///
    /// # Errors
    /// Returns error if the call fails or the service reports an error status
    fn send_prompt(
        &self,
        directory: &Path,
        session_id: &SessionId,
        request: &PromptRequest,
    ) -> impl Future<Output = Result<serde_json::Value>> + Send;

    /// Run a slash command in a session and wait for it to finish
    ///
    /// # Errors
    /// Returns error if the call fails or the service reports an error status
    fn send_command(
        &self,
        directory: &Path,
        session_id: &SessionId,
        request: &CommandRequest,
    ) -> impl Future<Output = Result<serde_json::Value>> + Send;

    /// List every open question known to the service, across all sessions
    ///
    /// # Errors
    /// Returns error if the call fails or the body is not a question list
    fn list_questions(&self, directory: &Path) -> impl Future<Output = Result<Vec<Question>>> + Send;

    /// Answer an open question
    ///
    /// # Errors
    /// Returns error if the service rejects the answer
    fn answer_question(
        &self,
        directory: &Path,
        request: &AnswerRequest,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Abort the run currently executing in a session
    ///
    /// # Errors
    /// Returns error if the call fails
    fn abort_session(
        &self,
        directory: &Path,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<T: AgentService> AgentService for Arc<T> {
    fn create_session(
        &self,
        directory: &Path,
        title: &str,
    ) -> impl Future<Output = Result<SessionId>> + Send {
        (**self).create_session(directory, title)
    }

    fn send_prompt(
        &self,
        directory: &Path,
        session_id: &SessionId,
        request: &PromptRequest,
    ) -> impl Future<Output = Result<serde_json::Value>> + Send {
        (**self).send_prompt(directory, session_id, request)
    }

    fn send_command(
        &self,
        directory: &Path,
        session_id: &SessionId,
        request: &CommandRequest,
    ) -> impl Future<Output = Result<serde_json::Value>> + Send {
        (**self).send_command(directory, session_id, request)
    }

    fn list_questions(&self, directory: &Path) -> impl Future<Output = Result<Vec<Question>>> + Send {
        (**self).list_questions(directory)
    }

    fn answer_question(
        &self,
        directory: &Path,
        request: &AnswerRequest,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).answer_question(directory, request)
    }

    fn abort_session(
        &self,
        directory: &Path,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).abort_session(directory, session_id)
    }
}
