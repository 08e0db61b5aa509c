//! Logging setup (tracing-subscriber, optional rolling log file)

use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Used when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str =
    "pixagent=info,pixagent_core=info,pixagent_infra_net=info,pixagent_infra_system=info";

/// Daily-rotated file name prefix inside `log_dir`
const LOG_FILE_PREFIX: &str = "pixagent.log";

/// Initialize the global subscriber
///
/// Console output uses `format`. With `log_dir` set, JSON lines are also
/// written to a daily-rotated file; keep the returned guard alive for the
/// lifetime of the process or buffered lines are lost.
pub fn init_logging(format: LogFormat, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init()?,
    }

    Ok(guard)
}
