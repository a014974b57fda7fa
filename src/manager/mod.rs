//! Per-session machinery
//!
//! Every session is driven by one actor task that owns its state, applies
//! queued commands in order, and starts at most one worker at a time.
//!
//! # Module Structure
//!
//! - `actor` - The actor loop, polling and watchdog
//! - `handle` - Cloneable handle the daemon uses to reach an actor
//! - `state` - The state machine, free of I/O
//! - `commands` - Command protocol between daemon and actor
//! - `worker` - One-shot remote calls

mod actor;
mod commands;
mod handle;
mod state;
mod worker;

pub(crate) use actor::spawn_session;
pub use actor::{ActorSettings, CONTINUE_MESSAGE};
pub use commands::SessionCommand;
pub use handle::SessionHandle;
