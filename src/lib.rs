#![recursion_limit = "256"]

//! # OpenCode Session Daemon
//!
//! A local daemon that coordinates long-running conversations with an
//! OpenCode agent service. Short-lived clients talk to it over a Unix socket;
//! the daemon keeps one actor per session that queues work, watches for
//! interactive questions, and recovers runs that stall.
//!
//! ## Quick Start
//!
//! Start (or reuse) the daemon, attach a session, send a message and wait:
//!
//! ```no_run
//! use kodegen_opencode_daemon::{DaemonClient, DaemonConfig, ModelRef, PromptRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DaemonConfig::load()?;
//!     let client = DaemonClient::from_config(&config);
//!     client.ensure_daemon().await?;
//!
//!     let session = client.create_session("refactor", None).await?;
//!     let prompt = PromptRequest::text(
//!         "sisyphus",
//!         ModelRef::new("zai-coding-plan", "glm-5"),
//!         "Explain the build layout",
//!     );
//!     client.prompt(&session, &prompt).await?;
//!
//!     let snapshot = client.wait_for_completion(&session).await?;
//!     log::info!("{}: {:?}", snapshot.state, snapshot.latest_response);
//!     Ok(())
//! }
//! ```
//!
//! ## Core Features
//!
//! ### 1. One actor per session
//!
//! Every session is owned by an actor task ([`manager`]). It applies queued
//! commands in order, runs at most one remote call at a time, and publishes
//! a [`SessionSnapshot`] after every change.
//!
//! ### 2. Interactive questions
//!
//! Actors poll the agent service for open questions. While one is pending
//! the session reports `WAITING_FOR_INPUT`; an ANSWER request clears it.
//!
//! ```no_run
//! # use kodegen_opencode_daemon::{AnswerRequest, DaemonClient, SessionId};
//! # async fn example(client: DaemonClient, session: SessionId) -> kodegen_opencode_daemon::Result<()> {
//! let snapshot = client.status(&session).await?;
//! if let Some(question) = snapshot.questions.first() {
//!     let answer = AnswerRequest {
//!         request_id: question.id.clone(),
//!         answers: vec![vec!["yes".to_string()]],
//!     };
//!     client.answer(&session, &answer).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### 3. Recovery
//!
//! A FIX request, or a task that stays BUSY past the watchdog ceiling,
//! aborts the remote run and sends a "continue" message. Results from the
//! superseded call are discarded.
//!
//! ### 4. Embedding
//!
//! [`daemon::run`] drives the whole daemon against any [`AgentService`], so
//! the socket server can run in-process (tests do this with an in-memory
//! service).
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`] with [`DaemonError`]. Each
//! variant carries a stable code (for example `SESSION_BUSY`) that the
//! daemon reports in error responses.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod manager;
pub mod registry;
pub mod service;
pub mod types;

// Re-export commonly used types for external API
pub use client::DaemonClient;
pub use config::DaemonConfig;
pub use daemon::{Action, Daemon, DaemonRequest, DaemonResponse};
pub use error::{DaemonError, Result};
pub use manager::{ActorSettings, SessionCommand, SessionHandle};
pub use registry::SessionRegistry;
pub use service::{AgentService, HttpAgentService};

// Re-export type submodules for flat public API
pub use types::identifiers::{QuestionId, SessionId};
pub use types::payloads::{
    AgentSelection, AnswerRequest, CommandRequest, ModelRef, Part, PromptRequest,
};
pub use types::question::{Question, QuestionOption, SubQuestion};
pub use types::session::{LatestResponse, SessionSnapshot, SessionState};

/// Version of the daemon
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
