//! Type definitions shared by the daemon, its actors and its client
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `QuestionId`)
//! - [`payloads`] - PROMPT / COMMAND / ANSWER bodies sent to the agent service
//! - [`question`] - Interactive question requests
//! - [`session`] - Session state and status snapshots

pub mod identifiers;
pub mod payloads;
pub mod question;
pub mod session;

pub use identifiers::{QuestionId, SessionId};
pub use payloads::{AgentSelection, AnswerRequest, CommandRequest, ModelRef, Part, PromptRequest};
pub use question::{Question, QuestionOption, SubQuestion};
pub use session::{LatestResponse, SessionSnapshot, SessionState};
