//! reqwest-backed agent service client

use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

use super::AgentService;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::types::question::QuestionList;
use crate::types::{AnswerRequest, CommandRequest, PromptRequest, Question, SessionId};

/// Header carrying the project directory a call is scoped to
const DIRECTORY_HEADER: &str = "x-opencode-directory";

const USER_AGENT: &str = concat!("kodegen-opencode-daemon/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the agent service
#[derive(Debug, Clone)]
pub struct HttpAgentService {
    base_url: String,
    http: Client,
    remote_timeout: Duration,
    /// Bound on polls, answers and aborts
    poll_timeout: Duration,
}

#[derive(serde::Deserialize)]
struct CreatedSession {
    id: SessionId,
}

impl HttpAgentService {
    /// Create a client for `base_url`
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be built
    pub fn new(
        base_url: impl Into<String>,
        remote_timeout: Duration,
        poll_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DaemonError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            remote_timeout,
            poll_timeout,
        })
    }

    /// Create a client from daemon configuration
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be built
    pub fn from_config(config: &DaemonConfig) -> Result<Self> {
        Self::new(
            config.agent_service_url.clone(),
            config.remote_timeout(),
            config.poll_timeout(),
        )
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str, directory: &Path) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(DIRECTORY_HEADER, directory.to_string_lossy().into_owned())
    }

    /// POST a JSON body and decode the response, `null` for an empty body
    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        directory: &Path,
        body: &B,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let response = self
            .request(Method::POST, path, directory)
            .json(body)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(DaemonError::remote(format!("API error {status} for {path}")));
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| DaemonError::remote(format!("Undecodable response from {path}: {e}")))
    }
}

impl AgentService for HttpAgentService {
    async fn create_session(&self, directory: &Path, title: &str) -> Result<SessionId> {
        let value = self
            .post_json("/session", directory, &json!({ "title": title }), self.remote_timeout)
            .await?;
        let created: CreatedSession = serde_json::from_value(value)
            .map_err(|e| DaemonError::remote(format!("Session response without id: {e}")))?;
        Ok(created.id)
    }

    async fn send_prompt(
        &self,
        directory: &Path,
        session_id: &SessionId,
        request: &PromptRequest,
    ) -> Result<serde_json::Value> {
        let path = format!("/session/{session_id}/message");
        self.post_json(&path, directory, request, self.remote_timeout)
            .await
    }

    async fn send_command(
        &self,
        directory: &Path,
        session_id: &SessionId,
        request: &CommandRequest,
    ) -> Result<serde_json::Value> {
        let path = format!("/session/{session_id}/command");
        self.post_json(&path, directory, request, self.remote_timeout)
            .await
    }

    async fn list_questions(&self, directory: &Path) -> Result<Vec<Question>> {
        let response = self
            .request(Method::GET, "/question", directory)
            .timeout(self.poll_timeout)
            .send()
            .await
            .map_err(|e| DaemonError::PollFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DaemonError::PollFailed(format!("API error {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DaemonError::PollFailed(e.to_string()))?;
        let list: QuestionList = serde_json::from_slice(&bytes)
            .map_err(|e| DaemonError::PollFailed(format!("Failed to parse questions: {e}")))?;
        Ok(list.into_vec())
    }

    async fn answer_question(&self, directory: &Path, request: &AnswerRequest) -> Result<()> {
        let path = format!("/question/{}/reply", request.request_id);
        self.post_json(
            &path,
            directory,
            &json!({ "answers": request.answers }),
            self.poll_timeout,
        )
        .await
        .map(|_| ())
        .map_err(|e| DaemonError::AnswerFailed(e.to_string()))
    }

    async fn abort_session(&self, directory: &Path, session_id: &SessionId) -> Result<()> {
        let path = format!("/session/{session_id}/abort");
        self.post_json(&path, directory, &json!({}), self.poll_timeout)
            .await
            .map(|_| ())
    }
}
