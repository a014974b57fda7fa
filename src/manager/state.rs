//! Session state machine
//!
//! `SessionCore` holds every mutable field of one session and applies the
//! transitions the actor loop drives. It does no I/O, so each transition can
//! be exercised synchronously.
//!
//! | From | Event | To |
//! |---|---|---|
//! | IDLE | task accepted | BUSY |
//! | BUSY | task while a worker runs | BUSY (dropped) |
//! | any | poll reports questions | WAITING_FOR_INPUT |
//! | WAITING_FOR_INPUT | poll reports none | BUSY or IDLE |
//! | any | current worker completes | unchanged, or IDLE when no question |
//! | any | answer empties the question set | BUSY or IDLE |
//! | any | recovery (fix / watchdog) | BUSY |
//! | any | abort | IDLE |
//!
//! The state is never assigned directly; it is derived from the question set
//! and worker liveness after every transition.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{LatestResponse, Question, QuestionId, SessionId, SessionSnapshot, SessionState};

/// Error recorded when a run is aborted on request
pub(crate) const ABORTED_BY_USER: &str = "Task aborted by user";

/// Mutable state of one session, owned by its actor
#[derive(Debug)]
pub(crate) struct SessionCore {
    session_id: SessionId,
    state: SessionState,
    latest_response: Option<LatestResponse>,
    pending_questions: Vec<Question>,
    task_started_at: Option<Instant>,
    generation: u64,
    worker_running: bool,
    last_activity: DateTime<Utc>,
}

impl SessionCore {
    pub(crate) fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: SessionState::Idle,
            latest_response: None,
            pending_questions: Vec::new(),
            task_started_at: None,
            generation: 0,
            worker_running: false,
            last_activity: Utc::now(),
        }
    }

    pub(crate) fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub(crate) fn worker_running(&self) -> bool {
        self.worker_running
    }

    #[cfg(test)]
    pub(crate) fn latest_response(&self) -> Option<&LatestResponse> {
        self.latest_response.as_ref()
    }

    pub(crate) fn pending_questions(&self) -> &[Question] {
        &self.pending_questions
    }

    #[cfg(test)]
    pub(crate) fn task_started_at(&self) -> Option<Instant> {
        self.task_started_at
    }

    fn settle(&mut self) {
        self.state = if !self.pending_questions.is_empty() {
            SessionState::WaitingForInput
        } else if self.worker_running {
            SessionState::Busy
        } else {
            SessionState::Idle
        };
        self.last_activity = Utc::now();
    }

    /// Start a new task; `None` when a worker is already running
    ///
    /// Returns the generation the new worker must be tagged with.
    pub(crate) fn begin_task(&mut self, now: Instant) -> Option<u64> {
        if self.worker_running {
            return None;
        }
        self.generation += 1;
        self.worker_running = true;
        self.latest_response = None;
        self.task_started_at = Some(now);
        self.settle();
        Some(self.generation)
    }

    /// Record a worker outcome; `false` when the worker was superseded
    pub(crate) fn complete(&mut self, generation: u64, response: LatestResponse) -> bool {
        if generation != self.generation {
            return false;
        }
        self.worker_running = false;
        self.latest_response = Some(response);
        self.task_started_at = None;
        self.settle();
        true
    }

    /// Replace the pending set with the questions that belong to this session
    ///
    /// Returns `true` when the set changed.
    pub(crate) fn apply_questions(&mut self, all: Vec<Question>) -> bool {
        let mine: Vec<Question> = all
            .into_iter()
            .filter(|q| q.belongs_to(&self.session_id))
            .collect();
        if mine == self.pending_questions {
            return false;
        }
        self.pending_questions = mine;
        self.settle();
        true
    }

    /// Drop an answered question ahead of the next poll
    pub(crate) fn answered(&mut self, question_id: &QuestionId, now: Instant) {
        let before = self.pending_questions.len();
        self.pending_questions.retain(|q| &q.id != question_id);
        if before != self.pending_questions.len()
            && self.pending_questions.is_empty()
            && self.worker_running
        {
            self.task_started_at = Some(now);
        }
        self.settle();
    }

    /// Orphan the current worker and prepare a replacement
    ///
    /// Returns the generation for the replacement worker.
    pub(crate) fn recover(&mut self, now: Instant) -> u64 {
        self.generation += 1;
        self.worker_running = true;
        self.latest_response = None;
        self.pending_questions.clear();
        self.task_started_at = Some(now);
        self.settle();
        self.generation
    }

    /// Orphan the current worker and return to IDLE
    pub(crate) fn abort(&mut self) {
        self.generation += 1;
        self.worker_running = false;
        self.pending_questions.clear();
        self.task_started_at = None;
        self.latest_response = Some(LatestResponse::failure(ABORTED_BY_USER));
        self.settle();
    }

    /// True when a BUSY task has run longer than `ceiling`
    pub(crate) fn watchdog_expired(&self, now: Instant, ceiling: Duration) -> bool {
        if self.state != SessionState::Busy || !self.worker_running {
            return false;
        }
        self.task_started_at
            .is_some_and(|started| now.saturating_duration_since(started) > ceiling)
    }

    pub(crate) fn snapshot(&self, queued: usize) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            session_id: self.session_id.clone(),
            latest_response: self.latest_response.clone(),
            questions: self.pending_questions.clone(),
            queued,
            last_activity: Some(self.last_activity),
        }
    }
}
