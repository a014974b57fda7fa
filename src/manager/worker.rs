//! One-shot workers
//!
//! A worker performs a single remote call on its own task and reports the
//! outcome to the actor exactly once. It carries no retry logic.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::service::AgentService;
use crate::types::{CommandRequest, LatestResponse, PromptRequest, SessionId};

/// The remote call a worker performs
#[derive(Debug, Clone)]
pub(crate) enum WorkerJob {
    Prompt(PromptRequest),
    Command(CommandRequest),
}

/// Outcome reported back to the actor
#[derive(Debug)]
pub(crate) struct WorkerOutcome {
    /// Generation the worker was started under
    pub generation: u64,
    pub response: LatestResponse,
}

pub(crate) struct WorkerSpec {
    pub directory: PathBuf,
    pub session_id: SessionId,
    pub job: WorkerJob,
    pub generation: u64,
    /// Wait before calling out, used after a remote abort
    pub delay: Duration,
}

/// Spawn a worker task
///
/// A panic inside the remote call is reported as an error outcome so the
/// actor always hears back.
pub(crate) fn spawn_worker<S: AgentService>(
    service: Arc<S>,
    spec: WorkerSpec,
    done_tx: mpsc::UnboundedSender<WorkerOutcome>,
) {
    tokio::spawn(async move {
        let WorkerSpec {
            directory,
            session_id,
            job,
            generation,
            delay,
        } = spec;

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let call = async {
            match &job {
                WorkerJob::Prompt(request) => {
                    service.send_prompt(&directory, &session_id, request).await
                }
                WorkerJob::Command(request) => {
                    service.send_command(&directory, &session_id, request).await
                }
            }
        };

        let response = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(result)) => LatestResponse::success(result),
            Ok(Err(e)) => {
                log::warn!("[{session_id}] Worker {generation} failed: {e}");
                LatestResponse::failure(e.to_string())
            }
            Err(_) => {
                log::error!("[{session_id}] Worker {generation} panicked");
                LatestResponse::failure("worker panicked")
            }
        };

        // The actor may already be gone; nothing is left to notify then.
        let _ = done_tx.send(WorkerOutcome {
            generation,
            response,
        });
    });
}
