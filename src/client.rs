//! Client for the daemon socket
//!
//! Each call opens a fresh connection, writes one request line, and reads
//! one response line.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::config::DaemonConfig;
use crate::daemon::protocol::{
    Action, CreateSessionPayload, DaemonRequest, DaemonResponse, StartSessionPayload,
};
use crate::error::{DaemonError, Result};
use crate::types::{AnswerRequest, CommandRequest, PromptRequest, SessionId, SessionSnapshot};

/// Connection attempts made after spawning the daemon
const SPAWN_RETRIES: u32 = 10;

/// Delay between connection attempts after spawning the daemon
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Client for a running (or spawnable) daemon
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    daemon_program: String,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl DaemonClient {
    /// Client for the daemon listening on `socket_path`
    #[must_use]
    pub fn new(socket_path: PathBuf) -> Self {
        Self::from_config(&DaemonConfig {
            socket_path: Some(socket_path),
            ..DaemonConfig::default()
        })
    }

    /// Client using the socket, program and timings from `config`
    #[must_use]
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            socket_path: config.socket_path(),
            daemon_program: config.daemon_program.clone(),
            poll_interval: config.poll_interval(),
            wait_timeout: config.client_wait_timeout(),
        }
    }

    /// Override how long [`wait_for_completion`](Self::wait_for_completion) waits
    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Override the GET_STATUS polling interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Socket this client connects to
    #[must_use]
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Send one request and return the raw response
    ///
    /// # Errors
    /// Returns `ConnectionRefused` if the socket cannot be reached, or an I/O
    /// or decode error if the exchange fails
    pub async fn send(&self, request: &DaemonRequest) -> Result<DaemonResponse> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| {
                DaemonError::connection_refused(format!("{}: {e}", self.socket_path.display()))
            })?;

        let (reader, mut writer) = stream.into_split();
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.shutdown().await?;

        let mut reader = BufReader::new(reader);
        let mut response = String::new();
        reader.read_line(&mut response).await?;
        if response.trim().is_empty() {
            return Err(DaemonError::internal("daemon closed the connection without a response"));
        }
        Ok(serde_json::from_str(&response)?)
    }

    /// Send a request and turn error responses into errors
    async fn call(&self, request: &DaemonRequest) -> Result<DaemonResponse> {
        self.send(request).await?.into_result()
    }

    /// Probe the daemon
    ///
    /// # Errors
    /// Returns error if no daemon answers
    pub async fn ping(&self) -> Result<()> {
        self.call(&DaemonRequest::new(Action::Ping, None, None))
            .await
            .map(|_| ())
    }

    /// Make sure a daemon is listening, spawning one if needed
    ///
    /// # Errors
    /// Returns error if the daemon program cannot be found or never answers
    pub async fn ensure_daemon(&self) -> Result<()> {
        if self.ping().await.is_ok() {
            return Ok(());
        }

        let program = which::which(&self.daemon_program).map_err(|e| {
            DaemonError::connection_refused(format!(
                "daemon not running and `{}` not found: {e}",
                self.daemon_program
            ))
        })?;
        log::info!("Starting daemon {}", program.display());

        let mut command = std::process::Command::new(&program);
        command
            .env("OPENCODE_DAEMON_SOCKET", &self.socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command.spawn()?;

        for _ in 0..SPAWN_RETRIES {
            tokio::time::sleep(SPAWN_RETRY_DELAY).await;
            if self.ping().await.is_ok() {
                return Ok(());
            }
        }
        Err(DaemonError::connection_refused(format!(
            "daemon did not come up on {}",
            self.socket_path.display()
        )))
    }

    /// Start (or re-attach to) the actor for an existing session
    ///
    /// # Errors
    /// Returns error if the daemon rejects the request
    pub async fn start_session(
        &self,
        session_id: &SessionId,
        working_dir: Option<PathBuf>,
    ) -> Result<()> {
        let request = DaemonRequest::with_payload(
            Action::StartSession,
            session_id.clone(),
            &StartSessionPayload { working_dir },
        )?;
        self.call(&request).await.map(|_| ())
    }

    /// Create a remote session and start its actor
    ///
    /// # Errors
    /// Returns error if the remote call fails or the response has no id
    pub async fn create_session(
        &self,
        title: &str,
        working_dir: Option<PathBuf>,
    ) -> Result<SessionId> {
        let payload = CreateSessionPayload {
            title: title.to_string(),
            working_dir,
        };
        let request = DaemonRequest::new(
            Action::CreateSession,
            None,
            Some(serde_json::to_value(&payload)?),
        );
        let data = self
            .call(&request)
            .await?
            .data
            .ok_or_else(|| DaemonError::internal("CREATE_SESSION returned no data"))?;
        let id = data
            .get("session_id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| DaemonError::internal("CREATE_SESSION returned no session_id"))?;
        Ok(SessionId::new(id))
    }

    /// Current snapshot of a session
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the daemon has no actor for the id
    pub async fn status(&self, session_id: &SessionId) -> Result<SessionSnapshot> {
        let request = DaemonRequest::new(Action::GetStatus, Some(session_id.clone()), None);
        let data = self
            .call(&request)
            .await?
            .data
            .ok_or_else(|| DaemonError::internal("GET_STATUS returned no data"))?;
        Ok(serde_json::from_value(data)?)
    }

    /// Queue a message
    ///
    /// # Errors
    /// Returns `SessionBusy` if the session is processing another request
    pub async fn prompt(&self, session_id: &SessionId, prompt: &PromptRequest) -> Result<()> {
        let request = DaemonRequest::with_payload(Action::Prompt, session_id.clone(), prompt)?;
        self.call(&request).await.map(|_| ())
    }

    /// Queue a slash command
    ///
    /// # Errors
    /// Returns error if the daemon rejects the request
    pub async fn command(&self, session_id: &SessionId, command: &CommandRequest) -> Result<()> {
        let request = DaemonRequest::with_payload(Action::Command, session_id.clone(), command)?;
        self.call(&request).await.map(|_| ())
    }

    /// Queue an answer
    ///
    /// # Errors
    /// Returns error if the daemon rejects the request
    pub async fn answer(&self, session_id: &SessionId, answer: &AnswerRequest) -> Result<()> {
        let request = DaemonRequest::with_payload(Action::Answer, session_id.clone(), answer)?;
        self.call(&request).await.map(|_| ())
    }

    /// Queue abort-and-continue recovery
    ///
    /// # Errors
    /// Returns error if the daemon rejects the request
    pub async fn fix(&self, session_id: &SessionId) -> Result<()> {
        let request = DaemonRequest::new(Action::Fix, Some(session_id.clone()), None);
        self.call(&request).await.map(|_| ())
    }

    /// Queue an abort
    ///
    /// # Errors
    /// Returns error if the daemon rejects the request
    pub async fn abort(&self, session_id: &SessionId) -> Result<()> {
        let request = DaemonRequest::new(Action::Abort, Some(session_id.clone()), None);
        self.call(&request).await.map(|_| ())
    }

    /// Poll until the session settles or the wait budget runs out
    ///
    /// Giving up only affects this client; the daemon keeps working.
    ///
    /// # Errors
    /// Returns `Timeout` when the budget is exhausted, or the first status error
    pub async fn wait_for_completion(&self, session_id: &SessionId) -> Result<SessionSnapshot> {
        tokio::time::timeout(self.wait_timeout, self.poll_until_settled(session_id))
            .await
            .map_err(|_| {
                DaemonError::timeout(format!(
                    "session {session_id} still busy after {:?}",
                    self.wait_timeout
                ))
            })?
    }

    async fn poll_until_settled(&self, session_id: &SessionId) -> Result<SessionSnapshot> {
        loop {
            let snapshot = self.status(session_id).await?;
            if snapshot.is_settled() {
                return Ok(snapshot);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
