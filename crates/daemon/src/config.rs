//! Agent configuration
//!
//! Layers, lowest precedence first: serde defaults, optional config file,
//! `PIXAGENT_*` environment variables, command-line flags.

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use pixagent_core::application::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_IMAGE_PATH, DEFAULT_RECONNECT_DELAY, DEFAULT_SERVER_HOST,
    DEFAULT_SERVER_PORT, DEFAULT_SUPERVISION_WINDOW, DEFAULT_TERMINATION_GRACE,
    DEFAULT_WORKER_BINARY,
};
use pixagent_core::application::{
    AgentSettings, ConnectionLifetime, ReconnectPolicy, SupervisionPolicy, WaitMode,
};
use pixagent_core::domain::WorkerCommand;
use pixagent_core::AppError;
use pixagent_infra_net::{AddressFraming, TcpAssignmentSource};

const ENV_PREFIX: &str = "PIXAGENT";

#[derive(Parser, Debug)]
#[command(name = "pixagent")]
#[command(about = "Pulls targets from the assignment server and runs the worker against them", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "PIXAGENT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Assignment server host
    #[arg(long)]
    pub host: Option<String>,

    /// Assignment server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Worker executable
    #[arg(short, long, value_name = "PATH")]
    pub worker: Option<String>,

    /// Local image file, overwritten every cycle
    #[arg(short, long, value_name = "PATH")]
    pub image: Option<String>,

    /// Supervision window per cycle
    #[arg(long, value_name = "SECS")]
    pub window: Option<u32>,

    /// Stop after this many cycles [default: run forever]
    #[arg(long, value_name = "N")]
    pub cycles: Option<u32>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Development: pretty formatting with colors
    #[default]
    Pretty,
    /// Production: JSON structured logging
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server_host: String,
    pub server_port: u16,
    pub connect_timeout_secs: u64,
    pub address_framing: AddressFraming,
    pub connection_lifetime: ConnectionLifetime,

    pub image_path: String,
    pub worker_binary: String,
    pub worker_image_arg: Option<String>,
    pub worker_extra_args: Vec<String>,

    pub window_secs: u64,
    pub wait_mode: WaitMode,
    pub termination_grace_secs: u64,
    pub escalate_to_kill: bool,

    pub retry_delay_ms: u64,
    pub max_connect_failures: Option<u32>,
    /// Pause after a failed receive (0 = reconnect immediately)
    pub receive_retry_delay_ms: u64,
    pub max_cycles: Option<u64>,

    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            address_framing: AddressFraming::default(),
            connection_lifetime: ConnectionLifetime::default(),
            image_path: DEFAULT_IMAGE_PATH.to_string(),
            worker_binary: DEFAULT_WORKER_BINARY.to_string(),
            worker_image_arg: None,
            worker_extra_args: Vec::new(),
            window_secs: DEFAULT_SUPERVISION_WINDOW.as_secs(),
            wait_mode: WaitMode::default(),
            termination_grace_secs: DEFAULT_TERMINATION_GRACE.as_secs(),
            escalate_to_kill: true,
            retry_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            max_connect_failures: None,
            receive_retry_delay_ms: 0,
            max_cycles: None,
            log_format: LogFormat::default(),
            log_dir: None,
        }
    }
}

impl AgentConfig {
    /// Merge all configuration layers
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = &cli.config {
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("worker_extra_args"),
            )
            .set_override_option("server_host", cli.host.clone())?
            .set_override_option("server_port", cli.port.map(i64::from))?
            .set_override_option("worker_binary", cli.worker.clone())?
            .set_override_option("image_path", cli.image.clone())?
            .set_override_option("window_secs", cli.window.map(i64::from))?
            .set_override_option("max_cycles", cli.cycles.map(i64::from))?
            .build()?
            .try_deserialize()
    }

    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.window_secs == 0 {
            return Err(AppError::Config(
                "window_secs must be greater than zero".to_string(),
            ));
        }
        if self.server_port == 0 {
            return Err(AppError::Config("server_port must not be 0".to_string()));
        }
        if self.worker_binary.trim().is_empty() {
            return Err(AppError::Config("worker_binary must be set".to_string()));
        }
        if self.image_path.trim().is_empty() {
            return Err(AppError::Config("image_path must be set".to_string()));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn assignment_source(&self) -> TcpAssignmentSource {
        TcpAssignmentSource::new(self.server_host.clone(), self.server_port)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_framing(self.address_framing)
    }

    pub fn supervision_policy(&self) -> SupervisionPolicy {
        SupervisionPolicy {
            window: Duration::from_secs(self.window_secs),
            wait_mode: self.wait_mode,
            grace: Duration::from_secs(self.termination_grace_secs),
            escalate: self.escalate_to_kill,
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.retry_delay_ms),
            self.max_connect_failures,
        )
        .with_receive_failure_delay(Duration::from_millis(self.receive_retry_delay_ms))
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            image_path: expand(&self.image_path),
            worker: WorkerCommand {
                program: expand(&self.worker_binary),
                image_arg: self.worker_image_arg.as_deref().map(expand),
                extra_args: self.worker_extra_args.clone(),
            },
            connection_lifetime: self.connection_lifetime,
            max_cycles: self.max_cycles,
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
