//! Request dispatch and the Unix socket server

use futures::FutureExt;
use serde::de::DeserializeOwned;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use super::protocol::{
    Action, CreateSessionPayload, DaemonRequest, DaemonResponse, StartSessionPayload,
    is_interrupt_safe,
};
use crate::error::{DaemonError, Result};
use crate::manager::{SessionCommand, SessionHandle};
use crate::registry::SessionRegistry;
use crate::service::AgentService;
use crate::types::{AnswerRequest, CommandRequest, PromptRequest, SessionId, SessionState};

/// Largest request accepted on one connection
pub const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

/// How long a connection may take to send its request line
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Title used by CREATE_SESSION when the client sends none
const DEFAULT_SESSION_TITLE: &str = "OpenCode session";

/// Routes requests to session actors
pub struct Daemon<S: AgentService> {
    registry: SessionRegistry<S>,
    read_timeout: Duration,
}

impl<S: AgentService> Daemon<S> {
    /// Create a daemon around a registry
    pub fn new(registry: SessionRegistry<S>) -> Self {
        Self {
            registry,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the deadline for receiving a request line
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Session registry
    pub fn registry(&self) -> &SessionRegistry<S> {
        &self.registry
    }

    /// Handle one request; every failure becomes an error response
    pub async fn dispatch(&self, request: DaemonRequest) -> DaemonResponse {
        let action = request.action.clone();
        match self.handle(request).await {
            Ok(response) => response,
            Err(e) => {
                log::debug!("{action} failed: {e}");
                DaemonResponse::from(e)
            }
        }
    }

    async fn handle(&self, request: DaemonRequest) -> Result<DaemonResponse> {
        let action: Action = request.action.parse()?;
        log::debug!(
            "{action} for {}",
            request
                .session_id
                .as_ref()
                .map_or("<none>", SessionId::as_str)
        );

        match action {
            Action::Ping => Ok(DaemonResponse::ok("PONG")),
            Action::StartSession => {
                let session_id = require_session(&request)?;
                let payload: StartSessionPayload = optional_payload(request.payload)?;
                let (_, created) = self.registry.ensure(&session_id, payload.working_dir)?;
                if created {
                    log::info!("Started actor for session {session_id}");
                }
                Ok(DaemonResponse::ok("Session managed"))
            }
            Action::CreateSession => self.create_session(request.payload).await,
            Action::GetStatus => {
                let handle = self.lookup(&request)?;
                Ok(DaemonResponse::data(serde_json::to_value(handle.snapshot())?))
            }
            Action::Prompt => {
                let handle = self.lookup(&request)?;
                let prompt: PromptRequest = required_payload(request.payload)?;
                if handle.state() == SessionState::Busy
                    && !prompt.first_text().is_some_and(is_interrupt_safe)
                {
                    return Err(DaemonError::session_busy(handle.session_id().as_str()));
                }
                submit(&handle, SessionCommand::Prompt(prompt))
            }
            Action::Command => {
                let handle = self.lookup(&request)?;
                let command: CommandRequest = required_payload(request.payload)?;
                submit(&handle, SessionCommand::Command(command))
            }
            Action::Answer => {
                let handle = self.lookup(&request)?;
                let answer: AnswerRequest = required_payload(request.payload)?;
                submit(&handle, SessionCommand::Answer(answer))
            }
            Action::Fix => submit(&self.lookup(&request)?, SessionCommand::Fix),
            Action::Abort => submit(&self.lookup(&request)?, SessionCommand::Abort),
        }
    }

    async fn create_session(&self, payload: Option<serde_json::Value>) -> Result<DaemonResponse> {
        let payload: CreateSessionPayload = optional_payload(payload)?;
        let directory = payload
            .working_dir
            .unwrap_or_else(|| self.registry.default_directory().clone());
        let title = if payload.title.trim().is_empty() {
            DEFAULT_SESSION_TITLE
        } else {
            payload.title.as_str()
        };

        let session_id = self
            .registry
            .service()
            .create_session(&directory, title)
            .await?;
        self.registry.ensure(&session_id, Some(directory))?;
        log::info!("Created session {session_id}");

        Ok(DaemonResponse::data(
            serde_json::json!({ "session_id": session_id }),
        ))
    }

    fn lookup(&self, request: &DaemonRequest) -> Result<SessionHandle> {
        let session_id = require_session(request)?;
        self.registry
            .get(&session_id)
            .ok_or_else(|| DaemonError::session_not_found(session_id.as_str()))
    }

    /// Accept connections until `shutdown` fires
    ///
    /// Each connection is handled on its own task, so a slow request never
    /// holds up another.
    pub async fn serve(self: Arc<Self>, listener: UnixListener, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    log::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let daemon = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = daemon.handle_connection(stream).await {
                                log::warn!("Connection error: {e}");
                            }
                        });
                    }
                    Err(e) => log::error!("Accept error: {e}"),
                },
            }
        }
    }

    async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader).take(MAX_REQUEST_BYTES + 1);
        let mut buf = Vec::new();
        let read = tokio::time::timeout(self.read_timeout, reader.read_until(b'\n', &mut buf)).await;

        let response = match read {
            Err(_) => {
                log::debug!("No request received within {:?}", self.read_timeout);
                DaemonResponse::from(DaemonError::malformed("request not received in time"))
            }
            Ok(result) => {
                result?;
                self.respond(&buf).await
            }
        };

        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.shutdown().await?;
        Ok(())
    }

    async fn respond(&self, buf: &[u8]) -> DaemonResponse {
        if buf.len() as u64 > MAX_REQUEST_BYTES {
            return DaemonResponse::from(DaemonError::malformed("request exceeds 1 MiB"));
        }
        let request = match serde_json::from_slice::<DaemonRequest>(buf) {
            Ok(request) => request,
            Err(e) => return DaemonResponse::from(DaemonError::malformed(e.to_string())),
        };
        match AssertUnwindSafe(self.dispatch(request)).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                log::error!("Request handler panicked");
                DaemonResponse::from(DaemonError::internal("request handler panicked"))
            }
        }
    }
}

fn submit(handle: &SessionHandle, command: SessionCommand) -> Result<DaemonResponse> {
    handle.submit(command)?;
    Ok(DaemonResponse::ok("Request submitted"))
}

fn require_session(request: &DaemonRequest) -> Result<SessionId> {
    match &request.session_id {
        Some(id) if !id.is_blank() => Ok(id.clone()),
        _ => Err(DaemonError::malformed("session_id is required")),
    }
}

fn required_payload<T: DeserializeOwned>(payload: Option<serde_json::Value>) -> Result<T> {
    let payload = payload.ok_or_else(|| DaemonError::malformed("payload is required"))?;
    serde_json::from_value(payload).map_err(|e| DaemonError::malformed(format!("invalid payload: {e}")))
}

fn optional_payload<T: DeserializeOwned + Default>(payload: Option<serde_json::Value>) -> Result<T> {
    match payload {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| DaemonError::malformed(format!("invalid payload: {e}"))),
    }
}
