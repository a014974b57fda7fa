// OpenCode session daemon
//
// Serves session actors over a Unix socket. Usually spawned on demand by
// `DaemonClient::ensure_daemon`, which detaches it from the terminal.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::IsTerminal;

use kodegen_opencode_daemon::{DaemonConfig, HttpAgentService, daemon};

fn init_logging(config: &DaemonConfig) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if !std::io::stderr().is_terminal() {
        std::fs::create_dir_all(&config.state_dir)
            .with_context(|| format!("creating {}", config.state_dir.display()))?;
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.log_file())
            .with_context(|| format!("opening {}", config.log_file().display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::load().context("loading configuration")?;
    init_logging(&config)?;

    log::info!(
        "kodegen-opencode-daemon {} (project root {})",
        kodegen_opencode_daemon::VERSION,
        config.project_root.display()
    );

    let service = HttpAgentService::from_config(&config)?;
    let shutdown = daemon::shutdown_on_signal()?;
    daemon::run(&config, service, shutdown).await?;
    Ok(())
}
