//! Session registry owned by the daemon

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::manager::{ActorSettings, SessionCommand, SessionHandle, spawn_session};
use crate::service::AgentService;
use crate::types::SessionId;

struct RegistryEntry {
    handle: SessionHandle,
    directory: PathBuf,
    task: JoinHandle<()>,
}

/// Maps session ids to running actors
///
/// Lookups and inserts happen under one lock, so concurrent `START_SESSION`
/// requests for the same id start exactly one actor. Actor internals stay
/// behind [`SessionHandle`].
pub struct SessionRegistry<S: AgentService> {
    service: Arc<S>,
    settings: ActorSettings,
    default_directory: PathBuf,
    sessions: Mutex<HashMap<SessionId, RegistryEntry>>,
    cancel: CancellationToken,
}

impl<S: AgentService> SessionRegistry<S> {
    /// Create an empty registry
    ///
    /// `default_directory` scopes sessions started without a working directory.
    pub fn new(service: Arc<S>, settings: ActorSettings, default_directory: PathBuf) -> Self {
        Self {
            service,
            settings,
            default_directory,
            sessions: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Shared agent service
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Directory used when a session does not name one
    pub fn default_directory(&self) -> &PathBuf {
        &self.default_directory
    }

    /// Get the actor for `session_id`, starting one if needed
    ///
    /// Returns the handle and whether a new actor was started. For an
    /// existing actor, a different `directory` is queued as an update; the
    /// same or no directory leaves it untouched.
    ///
    /// # Errors
    /// Returns error if the directory update cannot be queued
    pub fn ensure(
        &self,
        session_id: &SessionId,
        directory: Option<PathBuf>,
    ) -> Result<(SessionHandle, bool)> {
        let mut sessions = self.sessions.lock();

        if let Some(entry) = sessions.get_mut(session_id)
            && !entry.handle.is_stopped()
        {
            if let Some(directory) = directory
                && directory != entry.directory
            {
                entry
                    .handle
                    .submit(SessionCommand::SetWorkingDir(directory.clone()))?;
                entry.directory = directory;
            }
            return Ok((entry.handle.clone(), false));
        }

        let directory = directory.unwrap_or_else(|| self.default_directory.clone());
        let (handle, task) = spawn_session(
            Arc::clone(&self.service),
            session_id.clone(),
            directory.clone(),
            self.settings.clone(),
            self.cancel.child_token(),
        );
        log::info!("Registered session {session_id}");
        sessions.insert(
            session_id.clone(),
            RegistryEntry {
                handle: handle.clone(),
                directory,
                task,
            },
        );
        Ok((handle, true))
    }

    /// Handle of a running actor
    pub fn get(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|entry| entry.handle.clone())
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// True if no session is registered
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Stop every actor and wait for them to exit
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let entries: Vec<(SessionId, RegistryEntry)> = self.sessions.lock().drain().collect();
        log::info!("Stopping {} session actor(s)", entries.len());

        for (_, entry) in &entries {
            entry.handle.stop();
        }
        for (session_id, entry) in entries {
            if let Err(e) = entry.task.await {
                log::warn!("Session actor {session_id} ended abnormally: {e}");
            }
        }
    }
}

impl<S: AgentService> Drop for SessionRegistry<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
