//! Shared fixtures for integration tests
//!
//! `MockAgentService` stands in for the remote agent service: replies are
//! scripted per call, questions are set directly, and every call is recorded.

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use kodegen_opencode_daemon::{
    ActorSettings, AgentSelection, AgentService, AnswerRequest, CommandRequest, DaemonError,
    ModelRef, PromptRequest, Question, QuestionId, Result, SessionHandle, SessionId,
    SessionRegistry, SessionSnapshot,
};

/// How the next prompt/command call behaves
pub enum Reply {
    /// Return immediately with this body
    Ok(Value),
    /// Fail immediately
    Fail(String),
    /// Block until the session is aborted, then fail
    Hang,
    /// Block until the gate is notified, then return the result
    Gated(Arc<Notify>, std::result::Result<Value, String>),
}

#[derive(Default)]
struct Recorded {
    replies: VecDeque<Reply>,
    prompts: Vec<(SessionId, PromptRequest)>,
    commands: Vec<(SessionId, CommandRequest)>,
    answers: Vec<AnswerRequest>,
    aborts: Vec<SessionId>,
    directories: Vec<PathBuf>,
    questions: Vec<Question>,
    poll_fails: bool,
    answer_fails: bool,
    answer_stalls: bool,
    abort_stalls: bool,
    polls: usize,
    created: usize,
}

pub struct MockAgentService {
    recorded: Mutex<Recorded>,
    abort_epoch: Mutex<CancellationToken>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockAgentService {
    fn default() -> Self {
        Self {
            recorded: Mutex::new(Recorded::default()),
            abort_epoch: Mutex::new(CancellationToken::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockAgentService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_reply(&self, reply: Reply) {
        self.recorded.lock().replies.push_back(reply);
    }

    pub fn set_questions(&self, questions: Vec<Question>) {
        self.recorded.lock().questions = questions;
    }

    pub fn set_poll_fails(&self, fails: bool) {
        self.recorded.lock().poll_fails = fails;
    }

    pub fn set_answer_fails(&self, fails: bool) {
        self.recorded.lock().answer_fails = fails;
    }

    /// Make every answer call block forever
    pub fn set_answer_stalls(&self, stalls: bool) {
        self.recorded.lock().answer_stalls = stalls;
    }

    /// Make every abort call block forever
    pub fn set_abort_stalls(&self, stalls: bool) {
        self.recorded.lock().abort_stalls = stalls;
    }

    pub fn prompts(&self) -> Vec<(SessionId, PromptRequest)> {
        self.recorded.lock().prompts.clone()
    }

    pub fn prompt_texts(&self) -> Vec<String> {
        self.prompts()
            .iter()
            .map(|(_, p)| p.first_text().unwrap_or_default().to_string())
            .collect()
    }

    pub fn commands(&self) -> Vec<(SessionId, CommandRequest)> {
        self.recorded.lock().commands.clone()
    }

    pub fn answers(&self) -> Vec<AnswerRequest> {
        self.recorded.lock().answers.clone()
    }

    pub fn aborts(&self) -> Vec<SessionId> {
        self.recorded.lock().aborts.clone()
    }

    pub fn directories(&self) -> Vec<PathBuf> {
        self.recorded.lock().directories.clone()
    }

    pub fn polls(&self) -> usize {
        self.recorded.lock().polls
    }

    pub fn created(&self) -> usize {
        self.recorded.lock().created
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    async fn reply(&self, directory: &Path) -> Result<Value> {
        let _guard = self.enter();
        let (reply, epoch) = {
            let mut recorded = self.recorded.lock();
            recorded.directories.push(directory.to_path_buf());
            let reply = recorded
                .replies
                .pop_front()
                .unwrap_or_else(|| Reply::Ok(json!({"info": {"finish": "stop"}})));
            (reply, self.abort_epoch.lock().clone())
        };

        match reply {
            Reply::Ok(value) => Ok(value),
            Reply::Fail(message) => Err(DaemonError::remote(message)),
            Reply::Hang => {
                epoch.cancelled().await;
                Err(DaemonError::remote("aborted"))
            }
            Reply::Gated(gate, result) => {
                gate.notified().await;
                result.map_err(DaemonError::remote)
            }
        }
    }
}

impl AgentService for MockAgentService {
    async fn create_session(&self, directory: &Path, title: &str) -> Result<SessionId> {
        let mut recorded = self.recorded.lock();
        recorded.created += 1;
        recorded.directories.push(directory.to_path_buf());
        Ok(SessionId::new(format!("ses_{title}_{}", recorded.created)))
    }

    async fn send_prompt(
        &self,
        directory: &Path,
        session_id: &SessionId,
        request: &PromptRequest,
    ) -> Result<Value> {
        self.recorded
            .lock()
            .prompts
            .push((session_id.clone(), request.clone()));
        self.reply(directory).await
    }

    async fn send_command(
        &self,
        directory: &Path,
        session_id: &SessionId,
        request: &CommandRequest,
    ) -> Result<Value> {
        self.recorded
            .lock()
            .commands
            .push((session_id.clone(), request.clone()));
        self.reply(directory).await
    }

    async fn list_questions(&self, _directory: &Path) -> Result<Vec<Question>> {
        let mut recorded = self.recorded.lock();
        recorded.polls += 1;
        if recorded.poll_fails {
            return Err(DaemonError::PollFailed("connection reset".to_string()));
        }
        Ok(recorded.questions.clone())
    }

    async fn answer_question(&self, _directory: &Path, request: &AnswerRequest) -> Result<()> {
        if self.recorded.lock().answer_stalls {
            std::future::pending::<()>().await;
        }
        let mut recorded = self.recorded.lock();
        if recorded.answer_fails {
            return Err(DaemonError::AnswerFailed("rejected".to_string()));
        }
        recorded.answers.push(request.clone());
        recorded.questions.retain(|q| q.id != request.request_id);
        Ok(())
    }

    async fn abort_session(&self, _directory: &Path, session_id: &SessionId) -> Result<()> {
        let stalls = {
            let mut recorded = self.recorded.lock();
            recorded.aborts.push(session_id.clone());
            recorded.abort_stalls
        };
        if stalls {
            std::future::pending::<()>().await;
        }
        let mut epoch = self.abort_epoch.lock();
        epoch.cancel();
        *epoch = CancellationToken::new();
        Ok(())
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn settings() -> ActorSettings {
    ActorSettings {
        poll_interval: Duration::from_secs(2),
        queue_wait: Duration::from_secs(1),
        watchdog_timeout: Duration::from_secs(600),
        abort_settle: Duration::from_secs(3),
        fallback: AgentSelection {
            agent: "fallback-agent".to_string(),
            model: ModelRef::new("fallback", "model"),
        },
    }
}

pub fn registry(service: &Arc<MockAgentService>) -> SessionRegistry<MockAgentService> {
    SessionRegistry::new(Arc::clone(service), settings(), PathBuf::from("/work/project"))
}

pub fn prompt(text: &str) -> PromptRequest {
    PromptRequest::text("build", ModelRef::new("zai", "glm-5"), text)
}

pub fn question(id: &str, session: &str) -> Question {
    serde_json::from_value(json!({
        "id": id,
        "sessionID": session,
        "questions": [{"question": "Proceed?", "options": [{"label": "yes"}, {"label": "no"}]}]
    }))
    .unwrap()
}

pub fn answer(id: &str) -> AnswerRequest {
    AnswerRequest {
        request_id: QuestionId::new(id),
        answers: vec![vec!["yes".to_string()]],
    }
}

/// Poll the handle's snapshot until `pred` holds, advancing (paused) time
pub async fn wait_for(
    handle: &SessionHandle,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    for _ in 0..40_000 {
        let snapshot = handle.snapshot();
        if pred(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached, last snapshot: {:?}", handle.snapshot());
}
