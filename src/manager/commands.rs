//! Session command protocol
//!
//! Commands the daemon queues to a session actor. The actor applies them in
//! arrival order; the daemon never waits for one to be applied.

use std::path::PathBuf;

use crate::types::{AnswerRequest, CommandRequest, PromptRequest};

/// Work queued to a session actor
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Post a message to the session
    Prompt(PromptRequest),

    /// Run a slash command in the session
    Command(CommandRequest),

    /// Answer an open question
    Answer(AnswerRequest),

    /// Abort the current run and send a "continue" message
    Fix,

    /// Abort the current run and go idle
    Abort,

    /// Scope subsequent remote calls to another project directory
    SetWorkingDir(PathBuf),
}

impl SessionCommand {
    /// Short name used in log lines
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Prompt(_) => "PROMPT",
            Self::Command(_) => "COMMAND",
            Self::Answer(_) => "ANSWER",
            Self::Fix => "FIX",
            Self::Abort => "ABORT",
            Self::SetWorkingDir(_) => "SET_WORKING_DIR",
        }
    }
}
