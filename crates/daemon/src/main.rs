//! pixagent - Main Entry Point
//! Connects to the assignment server, receives a target and image, and runs
//! the worker against it for one supervision window, forever.

mod config;
mod logging;
mod shutdown;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use config::{AgentConfig, Cli};
use shutdown::ShutdownSignals;
use pixagent_core::application::{stop_channel, Agent, ProcessSupervisor};
use pixagent_infra_system::SubprocessLauncher;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let cli = Cli::parse();
    let config = AgentConfig::load(&cli).context("Failed to load configuration")?;
    config.validate()?;

    // 2. Initialize logging
    let _log_guard = logging::init_logging(config.log_format, config.log_dir.as_deref())
        .context("Failed to initialize logging")?;

    info!("pixagent v{} starting...", VERSION);
    info!(
        endpoint = %config.endpoint(),
        worker = %config.worker_binary,
        image_path = %config.image_path,
        window_secs = %config.window_secs,
        framing = ?config.address_framing,
        connection_lifetime = ?config.connection_lifetime,
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let source = Arc::new(config.assignment_source());
    let launcher = Arc::new(SubprocessLauncher::new());
    let supervisor = ProcessSupervisor::new(launcher, config.supervision_policy());
    let agent = Agent::new(
        source,
        supervisor,
        config.reconnect_policy(),
        config.agent_settings(),
    );

    // 4. Stop after the current cycle on SIGTERM or Ctrl+C
    let (stop_handle, stop_token) = stop_channel();
    ShutdownSignals::register()?.forward_to(stop_handle);

    // 5. Run until stopped (probe failure and connect give-up are fatal)
    let report = agent.run(stop_token).await.context("Agent loop failed")?;

    info!(
        cycles = %report.cycles,
        assignments = %report.assignments,
        "Shutdown complete."
    );

    Ok(())
}
