//! OS shutdown signals
//!
//! SIGTERM (process managers) and SIGINT (Ctrl+C) both stop the agent after
//! the current cycle, so a running worker is still signalled before exit.

use anyhow::Result;
use tracing::info;

use pixagent_core::application::StopHandle;

/// Signal streams, registered before the agent starts
pub struct ShutdownSignals {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Replace the default (immediate exit) disposition of the stop signals
    pub fn register() -> Result<Self> {
        #[cfg(unix)]
        {
            use anyhow::Context;
            use tokio::signal::unix::{signal, SignalKind};

            Ok(Self {
                sigterm: signal(SignalKind::terminate())
                    .context("Failed to register SIGTERM handler")?,
                sigint: signal(SignalKind::interrupt())
                    .context("Failed to register SIGINT handler")?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the first stop signal and return its name
    pub async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigterm.recv() => "SIGTERM",
                _ = self.sigint.recv() => "SIGINT",
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            "Ctrl+C"
        }
    }

    /// Request a stop on the first signal
    pub fn forward_to(mut self, stop: StopHandle) {
        tokio::spawn(async move {
            let signal = self.recv().await;
            info!(signal = signal, "Shutdown signal received. Finishing current cycle...");
            stop.stop();
        });
    }
}
