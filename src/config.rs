//! Configuration management for the daemon and its client

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DaemonError, Result};
use crate::types::{AgentSelection, ModelRef};

/// Name of the state directory under the user's home
const STATE_DIR_NAME: &str = ".opencode_skill";

/// Daemon configuration
///
/// Every field has a default, so an empty `config.json` (or none at all) is
/// a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Base URL of the agent service
    pub agent_service_url: String,

    /// Default value of the directory-scoping header
    pub project_root: PathBuf,

    /// Directory holding the socket, pid file, log and config
    pub state_dir: PathBuf,

    /// Socket path override (defaults to `<state_dir>/daemon.sock`)
    pub socket_path: Option<PathBuf>,

    /// PID file override (defaults to `<state_dir>/daemon.pid`)
    pub pid_file: Option<PathBuf>,

    /// Minimum spacing between question polls
    pub poll_interval_ms: u64,

    /// Bounded wait on an actor's command queue
    pub queue_wait_ms: u64,

    /// Ceiling on a BUSY task before the watchdog recovers it
    pub watchdog_timeout_secs: u64,

    /// Delay between a remote abort and the replacement "continue" message
    pub abort_settle_ms: u64,

    /// How long a client waits for a result before giving up
    pub client_wait_timeout_secs: u64,

    /// Timeout for prompt/command calls to the agent service
    pub remote_timeout_secs: u64,

    /// Timeout for question polls, answers and aborts
    pub poll_timeout_secs: u64,

    /// Deadline for a client to send its request line
    pub request_timeout_ms: u64,

    /// Agent used for recovery when a session never recorded one
    pub default_agent: String,

    /// Model used for recovery when a session never recorded one
    pub default_model: ModelRef,

    /// Program a client spawns when no daemon is listening
    pub daemon_program: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            agent_service_url: "http://127.0.0.1:4096".to_string(),
            project_root: find_project_root(),
            state_dir: default_state_dir(),
            socket_path: None,
            pid_file: None,
            poll_interval_ms: 2_000,
            queue_wait_ms: 1_000,
            watchdog_timeout_secs: 600,
            abort_settle_ms: 3_000,
            client_wait_timeout_secs: 300,
            remote_timeout_secs: 600,
            poll_timeout_secs: 5,
            request_timeout_ms: 10_000,
            default_agent: "sisyphus".to_string(),
            default_model: ModelRef::new("zai-coding-plan", "glm-5"),
            daemon_program: "kodegen-opencode-daemon".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| DaemonError::invalid_config(format!("{}: {e}", path.display())))
    }

    /// Load from default locations (file first, then env overrides)
    pub fn load() -> Result<Self> {
        let state_dir = std::env::var("OPENCODE_DAEMON_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_state_dir());
        let config_path = state_dir.join("config.json");

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };
        config.state_dir = state_dir;
        config.apply_env();
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("OPENCODE_URL") {
            self.agent_service_url = url;
        }
        if let Ok(root) = std::env::var("OPENCODE_PROJECT_ROOT") {
            self.project_root = PathBuf::from(root);
        }
        if let Ok(socket) = std::env::var("OPENCODE_DAEMON_SOCKET") {
            self.socket_path = Some(PathBuf::from(socket));
        }
    }

    /// Resolved socket path
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join("daemon.sock"))
    }

    /// Resolved PID file path
    #[must_use]
    pub fn pid_file(&self) -> PathBuf {
        self.pid_file
            .clone()
            .unwrap_or_else(|| self.state_dir.join("daemon.pid"))
    }

    /// Daemon log file
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.state_dir.join("daemon.log")
    }

    /// Minimum spacing between question polls
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bounded wait on the command queue
    #[must_use]
    pub fn queue_wait(&self) -> Duration {
        Duration::from_millis(self.queue_wait_ms)
    }

    /// Watchdog ceiling
    #[must_use]
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_secs)
    }

    /// Abort settle delay
    #[must_use]
    pub fn abort_settle(&self) -> Duration {
        Duration::from_millis(self.abort_settle_ms)
    }

    /// Client-side wait budget
    #[must_use]
    pub fn client_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.client_wait_timeout_secs)
    }

    /// Prompt/command call timeout
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// Timeout for polls, answers and aborts
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Deadline for reading one request
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Agent/model used by recovery when a session has none recorded
    #[must_use]
    pub fn fallback_selection(&self) -> AgentSelection {
        AgentSelection {
            agent: self.default_agent.clone(),
            model: self.default_model.clone(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STATE_DIR_NAME)
}

/// Nearest ancestor of the working directory containing `.git`, else the cwd
fn find_project_root() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    project_root_from(&cwd)
}

fn project_root_from(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map_or_else(|| start.to_path_buf(), Path::to_path_buf)
}
