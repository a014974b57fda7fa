//! Daemon process: socket server, lifecycle, and wire protocol

pub mod pidfile;
pub mod protocol;
mod server;

use std::path::Path;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

use crate::client::DaemonClient;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::manager::ActorSettings;
use crate::registry::SessionRegistry;
use crate::service::AgentService;

pub use protocol::{
    Action, CreateSessionPayload, DaemonRequest, DaemonResponse, ResponseStatus,
    StartSessionPayload, is_interrupt_safe,
};
pub use server::{DEFAULT_READ_TIMEOUT, Daemon, MAX_REQUEST_BYTES};

/// Run the daemon until `shutdown` fires
///
/// Refuses to start if another daemon answers on the socket. Stale socket
/// and pid files are replaced. On shutdown every actor is stopped and both
/// files are removed.
///
/// # Errors
/// Returns error if a daemon is already running or the socket cannot be bound
pub async fn run<S: AgentService>(
    config: &DaemonConfig,
    service: S,
    shutdown: CancellationToken,
) -> Result<()> {
    let socket_path = config.socket_path();
    let pid_path = config.pid_file();

    std::fs::create_dir_all(&config.state_dir)?;
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if DaemonClient::new(socket_path.clone()).ping().await.is_ok() {
        return Err(DaemonError::DaemonRunning(socket_path.display().to_string()));
    }
    if socket_path.exists() {
        log::info!("Removing stale socket {}", socket_path.display());
        std::fs::remove_file(&socket_path)?;
    }

    let listener = bind(&socket_path)?;
    pidfile::write_pid(&pid_path, std::process::id())?;
    log::info!(
        "Daemon {} listening on {} (agent service {})",
        std::process::id(),
        socket_path.display(),
        config.agent_service_url
    );

    let registry = SessionRegistry::new(
        Arc::new(service),
        ActorSettings::from(config),
        config.project_root.clone(),
    );
    let daemon = Arc::new(Daemon::new(registry).with_read_timeout(config.request_timeout()));

    Arc::clone(&daemon).serve(listener, shutdown).await;
    daemon.registry().shutdown().await;

    if let Err(e) = pidfile::remove_pid(&pid_path) {
        log::warn!("Failed to remove pid file: {e}");
    }
    if let Err(e) = std::fs::remove_file(&socket_path) {
        log::warn!("Failed to remove socket: {e}");
    }
    log::info!("Daemon stopped");
    Ok(())
}

fn bind(socket_path: &Path) -> Result<UnixListener> {
    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(listener)
}

/// Token cancelled on SIGINT or SIGTERM
///
/// # Errors
/// Returns error if the signal handlers cannot be installed
pub fn shutdown_on_signal() -> Result<CancellationToken> {
    use tokio::signal::unix::{SignalKind, signal};

    let token = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
            _ = sigint.recv() => log::info!("Received SIGINT"),
        }
        cancel.cancel();
    });

    Ok(token)
}
