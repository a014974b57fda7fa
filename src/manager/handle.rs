//! Handle to a running session actor

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::commands::SessionCommand;
use crate::error::{DaemonError, Result};
use crate::types::{SessionId, SessionSnapshot, SessionState};

/// Cloneable handle used by the daemon to talk to one actor
///
/// The handle never touches actor state directly. Commands go through the
/// queue and reads come from the snapshot the actor publishes after every
/// change.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub(crate) session_id: SessionId,
    pub(crate) command_tx: mpsc::UnboundedSender<SessionCommand>,
    pub(crate) snapshot: Arc<RwLock<SessionSnapshot>>,
    pub(crate) queued: Arc<AtomicUsize>,
    pub(crate) cancel: CancellationToken,
}

impl SessionHandle {
    /// Session this handle addresses
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Queue a command without waiting for it to be applied
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the actor has already stopped
    pub fn submit(&self, command: SessionCommand) -> Result<()> {
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.command_tx.send(command).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(DaemonError::session_not_found(self.session_id.as_str()));
        }
        Ok(())
    }

    /// Consistent copy of the actor's latest published state
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = self.snapshot.read().clone();
        snapshot.queued = self.queued.load(Ordering::SeqCst);
        snapshot
    }

    /// Current state without cloning the whole snapshot
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.snapshot.read().state
    }

    /// Ask the actor to stop after its current iteration
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// True once the actor has been asked to stop
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.command_tx.is_closed()
    }
}
