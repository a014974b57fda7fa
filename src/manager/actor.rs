//! Session actor loop
//!
//! One long-lived task per session. Each iteration waits briefly for a
//! command or a worker outcome, drains whatever else is already queued, then
//! (at most once per poll interval) refreshes the session's questions and
//! checks the watchdog. All state lives in [`SessionCore`] and is only
//! mutated here.

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::commands::SessionCommand;
use super::handle::SessionHandle;
use super::state::SessionCore;
use super::worker::{WorkerJob, WorkerOutcome, WorkerSpec, spawn_worker};
use crate::config::DaemonConfig;
use crate::service::AgentService;
use crate::types::{
    AgentSelection, AnswerRequest, CommandRequest, PromptRequest, SessionId, SessionSnapshot,
};

/// Text of the message sent by recovery
pub const CONTINUE_MESSAGE: &str = "continue";

/// Timing and recovery parameters shared by every actor
#[derive(Debug, Clone)]
pub struct ActorSettings {
    /// Minimum spacing between question polls
    pub poll_interval: Duration,
    /// Bounded wait on the command queue
    pub queue_wait: Duration,
    /// Ceiling on a BUSY task before automatic recovery
    pub watchdog_timeout: Duration,
    /// Delay between a remote abort and the replacement message
    pub abort_settle: Duration,
    /// Agent/model for recovery when the session never recorded one
    pub fallback: AgentSelection,
}

impl From<&DaemonConfig> for ActorSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            queue_wait: config.queue_wait(),
            watchdog_timeout: config.watchdog_timeout(),
            abort_settle: config.abort_settle(),
            fallback: config.fallback_selection(),
        }
    }
}

impl Default for ActorSettings {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

/// Why a recovery was triggered, for logging
#[derive(Debug, Clone, Copy)]
enum Recovery {
    Fix,
    Watchdog,
}

pub(crate) struct SessionActor<S: AgentService> {
    core: SessionCore,
    service: Arc<S>,
    directory: PathBuf,
    settings: ActorSettings,
    last_selection: Option<AgentSelection>,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    done_tx: mpsc::UnboundedSender<WorkerOutcome>,
    done_rx: mpsc::UnboundedReceiver<WorkerOutcome>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    queued: Arc<AtomicUsize>,
    cancel: CancellationToken,
    last_poll: Option<Instant>,
}

/// Start an actor for `session_id` and return its handle and task
///
/// The actor stops when `cancel` fires or every handle is dropped.
pub(crate) fn spawn_session<S: AgentService>(
    service: Arc<S>,
    session_id: SessionId,
    directory: PathBuf,
    settings: ActorSettings,
    cancel: CancellationToken,
) -> (SessionHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let snapshot = Arc::new(RwLock::new(SessionSnapshot::idle(session_id.clone())));
    let queued = Arc::new(AtomicUsize::new(0));

    let actor = SessionActor {
        core: SessionCore::new(session_id.clone()),
        service,
        directory,
        settings,
        last_selection: None,
        command_rx,
        done_tx,
        done_rx,
        snapshot: Arc::clone(&snapshot),
        queued: Arc::clone(&queued),
        cancel: cancel.clone(),
        last_poll: None,
    };

    let handle = SessionHandle {
        session_id,
        command_tx,
        snapshot,
        queued,
        cancel,
    };

    (handle, tokio::spawn(actor.run()))
}

impl<S: AgentService> SessionActor<S> {
    async fn run(mut self) {
        let session_id = self.core.session_id().clone();
        log::info!(
            "[{session_id}] Session actor started in {}",
            self.directory.display()
        );
        self.publish();

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(outcome) = self.done_rx.recv() => self.on_worker_done(outcome),
                received = tokio::time::timeout(self.settings.queue_wait, self.command_rx.recv()) => {
                    match received {
                        Ok(Some(command)) => self.handle_command(command).await,
                        Ok(None) => {
                            log::debug!("[{session_id}] All handles dropped");
                            break;
                        }
                        Err(_) => {}
                    }
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }

            // Only what is queued right now; later arrivals wait for the next pass.
            for _ in 0..self.command_rx.len() {
                match self.command_rx.try_recv() {
                    Ok(command) => self.handle_command(command).await,
                    Err(_) => break,
                }
            }
            while let Ok(outcome) = self.done_rx.try_recv() {
                self.on_worker_done(outcome);
            }

            self.maybe_poll().await;
        }

        log::info!("[{session_id}] Session actor stopped");
    }

    fn publish(&self) {
        let queued = self.queued.load(Ordering::SeqCst);
        *self.snapshot.write() = self.core.snapshot(queued);
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        log::debug!("[{}] Applying {}", self.core.session_id(), command.name());
        match command {
            SessionCommand::Prompt(request) => self.start_prompt(request),
            SessionCommand::Command(request) => self.start_command(request),
            SessionCommand::Answer(request) => self.answer(request).await,
            SessionCommand::Fix => self.recover(Recovery::Fix).await,
            SessionCommand::Abort => self.abort().await,
            SessionCommand::SetWorkingDir(directory) => {
                log::info!(
                    "[{}] Working directory set to {}",
                    self.core.session_id(),
                    directory.display()
                );
                self.directory = directory;
            }
        }
        self.publish();
        self.queued.fetch_sub(1, Ordering::SeqCst);
    }

    fn start_prompt(&mut self, request: PromptRequest) {
        let Some(generation) = self.core.begin_task(Instant::now()) else {
            log::warn!(
                "[{}] PROMPT dropped, a worker is already running",
                self.core.session_id()
            );
            return;
        };
        self.last_selection = Some(AgentSelection::from(&request));
        self.spawn(WorkerJob::Prompt(request), generation, Duration::ZERO);
    }

    fn start_command(&mut self, request: CommandRequest) {
        let Some(generation) = self.core.begin_task(Instant::now()) else {
            log::warn!(
                "[{}] COMMAND /{} dropped, a worker is already running",
                self.core.session_id(),
                request.command
            );
            return;
        };
        self.last_selection = Some(AgentSelection::from(&request));
        self.spawn(WorkerJob::Command(request), generation, Duration::ZERO);
    }

    fn spawn(&self, job: WorkerJob, generation: u64, delay: Duration) {
        log::info!(
            "[{}] Starting worker {generation}",
            self.core.session_id()
        );
        spawn_worker(
            Arc::clone(&self.service),
            WorkerSpec {
                directory: self.directory.clone(),
                session_id: self.core.session_id().clone(),
                job,
                generation,
                delay,
            },
            self.done_tx.clone(),
        );
    }

    fn on_worker_done(&mut self, outcome: WorkerOutcome) {
        let generation = outcome.generation;
        let failed = outcome.response.is_error();
        if self.core.complete(generation, outcome.response) {
            log::info!(
                "[{}] Worker {generation} finished{}, state {}",
                self.core.session_id(),
                if failed { " with error" } else { "" },
                self.core.state()
            );
            self.publish();
        } else {
            log::debug!(
                "[{}] Discarding result of superseded worker {generation} (current {})",
                self.core.session_id(),
                self.core.generation()
            );
        }
    }

    /// Await a control call unless the actor is stopped first
    async fn unless_stopped<T>(&self, call: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            () = self.cancel.cancelled() => None,
            output = call => Some(output),
        }
    }

    async fn answer(&mut self, request: AnswerRequest) {
        let session_id = self.core.session_id().clone();
        let Some(answered) = self
            .unless_stopped(self.service.answer_question(&self.directory, &request))
            .await
        else {
            log::debug!("[{session_id}] Stopped while answering {}", request.request_id);
            return;
        };
        match answered {
            Ok(()) => {
                log::info!("[{session_id}] Answered question {}", request.request_id);
                self.core.answered(&request.request_id, Instant::now());
            }
            Err(e) => {
                log::warn!(
                    "[{session_id}] ANSWER_FAILED for question {}: {e}",
                    request.request_id
                );
            }
        }
    }

    /// Abort the remote run; `false` when the actor was stopped meanwhile
    async fn abort_remote(&self) -> bool {
        let session_id = self.core.session_id();
        match self
            .unless_stopped(self.service.abort_session(&self.directory, session_id))
            .await
        {
            None => {
                log::debug!("[{session_id}] Stopped while aborting");
                false
            }
            Some(Err(e)) => {
                log::warn!("[{session_id}] Remote abort failed: {e}");
                true
            }
            Some(Ok(())) => true,
        }
    }

    async fn recover(&mut self, reason: Recovery) {
        match reason {
            Recovery::Fix => log::info!("[{}] FIX requested", self.core.session_id()),
            Recovery::Watchdog => log::warn!(
                "[{}] Task exceeded {:?}, recovering automatically",
                self.core.session_id(),
                self.settings.watchdog_timeout
            ),
        }

        if !self.abort_remote().await {
            return;
        }
        let generation = self.core.recover(Instant::now());
        let selection = self
            .last_selection
            .clone()
            .unwrap_or_else(|| self.settings.fallback.clone());
        let request = PromptRequest::text(selection.agent, selection.model, CONTINUE_MESSAGE);
        self.spawn(
            WorkerJob::Prompt(request),
            generation,
            self.settings.abort_settle,
        );
    }

    async fn abort(&mut self) {
        log::info!("[{}] ABORT requested", self.core.session_id());
        if self.abort_remote().await {
            self.core.abort();
        }
    }

    async fn maybe_poll(&mut self) {
        let now = Instant::now();
        if self
            .last_poll
            .is_some_and(|last| now.saturating_duration_since(last) < self.settings.poll_interval)
        {
            return;
        }
        self.last_poll = Some(now);

        let polled = tokio::select! {
            () = self.cancel.cancelled() => return,
            polled = self.service.list_questions(&self.directory) => polled,
        };

        match polled {
            Ok(questions) => {
                let before = self.core.state();
                if self.core.apply_questions(questions) {
                    log::info!(
                        "[{}] Questions changed: {} pending, {before} -> {}",
                        self.core.session_id(),
                        self.core.pending_questions().len(),
                        self.core.state()
                    );
                    self.publish();
                }
            }
            Err(e) => log::warn!("[{}] POLL_FAILED: {e}", self.core.session_id()),
        }

        if self
            .core
            .watchdog_expired(Instant::now(), self.settings.watchdog_timeout)
        {
            self.recover(Recovery::Watchdog).await;
            self.publish();
        }
    }
}
