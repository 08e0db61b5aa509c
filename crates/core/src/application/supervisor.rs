// Process supervision: launch, bounded window, SIGTERM/SIGKILL
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, timeout, timeout_at, Instant};
use tracing::{info, warn};

use super::constants::{DEFAULT_SUPERVISION_WINDOW, DEFAULT_TERMINATION_GRACE};
use crate::domain::LaunchSpec;
use crate::port::{LaunchError, ProcessLauncher, SupervisionError, WorkerExit, WorkerHandle};

/// How the window is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitMode {
    /// Sleep out the whole window, then check the worker
    #[default]
    FullWindow,
    /// Return as soon as the worker exits on its own
    ReturnOnExit,
}

/// Supervision window parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionPolicy {
    pub window: Duration,
    pub wait_mode: WaitMode,
    /// Time allowed between SIGTERM and SIGKILL
    pub grace: Duration,
    /// Escalate to SIGKILL if SIGTERM is ignored
    pub escalate: bool,
}

impl Default for SupervisionPolicy {
    fn default() -> Self {
        Self {
            window: DEFAULT_SUPERVISION_WINDOW,
            wait_mode: WaitMode::FullWindow,
            grace: DEFAULT_TERMINATION_GRACE,
            escalate: true,
        }
    }
}

/// Result of one supervision window
#[derive(Debug)]
pub enum SupervisionOutcome {
    /// Worker could not be started; no time was spent waiting
    LaunchFailed(LaunchError),
    /// Worker was gone when checked, no signal sent
    ExitedWithinWindow(WorkerExit),
    /// Worker exited after SIGTERM
    Terminated(WorkerExit),
    /// SIGTERM sent without waiting for confirmation (escalation disabled)
    TerminationSent,
    /// Worker ignored SIGTERM and was killed
    Killed,
    /// Signalling failed; logged and swallowed
    SignalFailed(SupervisionError),
}

impl SupervisionOutcome {
    /// Whether a termination signal reached the worker
    pub fn signal_sent(&self) -> bool {
        matches!(
            self,
            SupervisionOutcome::Terminated(_)
                | SupervisionOutcome::TerminationSent
                | SupervisionOutcome::Killed
        )
    }

    pub fn launched(&self) -> bool {
        !matches!(self, SupervisionOutcome::LaunchFailed(_))
    }
}

/// Runs one worker per call and never leaves it running past its window
pub struct ProcessSupervisor {
    launcher: Arc<dyn ProcessLauncher>,
    policy: SupervisionPolicy,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, policy: SupervisionPolicy) -> Self {
        Self { launcher, policy }
    }

    /// Launch `spec` and supervise it for one window
    ///
    /// Never returns an error: launch and signal failures are logged and
    /// reported through the outcome. Exit codes are logged only.
    pub async fn supervise(&self, spec: &LaunchSpec) -> SupervisionOutcome {
        info!(
            program = %spec.program.display(),
            args = ?spec.args,
            window_ms = %self.policy.window.as_millis(),
            wait_mode = ?self.policy.wait_mode,
            "Launching worker"
        );

        let mut worker = match self.launcher.launch(spec).await {
            Ok(worker) => worker,
            Err(e) => {
                warn!(error = %e, "Worker launch failed, skipping supervision window");
                return SupervisionOutcome::LaunchFailed(e);
            }
        };
        let pid = worker.id();
        info!(pid = ?pid, "Worker started");

        if let Some(exit) = self.wait_window(worker.as_mut()).await {
            info!(pid = ?pid, exit = %exit, "Worker exited within window, no kill necessary");
            return SupervisionOutcome::ExitedWithinWindow(exit);
        }

        self.stop_worker(worker.as_mut(), pid).await
    }

    /// Spend the window; returns the exit if the worker is already gone
    async fn wait_window(&self, worker: &mut dyn WorkerHandle) -> Option<WorkerExit> {
        match self.policy.wait_mode {
            WaitMode::FullWindow => sleep(self.policy.window).await,
            WaitMode::ReturnOnExit => {
                let deadline = Instant::now() + self.policy.window;
                match timeout_at(deadline, worker.wait_exit()).await {
                    Ok(Ok(exit)) => return Some(exit),
                    Ok(Err(e)) => {
                        warn!(error = %e, "Waiting for worker failed, sleeping out the window");
                        sleep_until(deadline).await;
                    }
                    Err(_) => {}
                }
            }
        }

        match worker.try_exit() {
            Ok(exit) => exit,
            Err(e) => {
                warn!(error = %e, "Exit check failed, assuming worker is still running");
                None
            }
        }
    }

    /// SIGTERM, then SIGKILL after the grace period if allowed
    async fn stop_worker(&self, worker: &mut dyn WorkerHandle, pid: Option<u32>) -> SupervisionOutcome {
        info!(pid = ?pid, "Window elapsed, sending SIGTERM");
        if let Err(e) = worker.terminate() {
            // Worker may have exited between the check and the signal
            if let Ok(Some(exit)) = worker.try_exit() {
                info!(pid = ?pid, exit = %exit, "Worker exited before it could be signalled");
                return SupervisionOutcome::ExitedWithinWindow(exit);
            }
            warn!(pid = ?pid, error = %e, "Failed to signal worker");
            return SupervisionOutcome::SignalFailed(e);
        }

        if !self.policy.escalate {
            return SupervisionOutcome::TerminationSent;
        }

        match timeout(self.policy.grace, worker.wait_exit()).await {
            Ok(Ok(exit)) => {
                info!(pid = ?pid, exit = %exit, "Worker exited after SIGTERM");
                return SupervisionOutcome::Terminated(exit);
            }
            Ok(Err(e)) => warn!(pid = ?pid, error = %e, "Waiting after SIGTERM failed"),
            Err(_) => warn!(
                pid = ?pid,
                grace_ms = %self.policy.grace.as_millis(),
                "Worker did not exit after SIGTERM, sending SIGKILL"
            ),
        }

        if let Err(e) = worker.kill() {
            warn!(pid = ?pid, error = %e, "Failed to kill worker");
            return SupervisionOutcome::SignalFailed(e);
        }
        match timeout(self.policy.grace, worker.wait_exit()).await {
            Ok(Ok(_)) => info!(pid = ?pid, "Worker killed"),
            Ok(Err(e)) => warn!(pid = ?pid, error = %e, "Waiting after SIGKILL failed"),
            Err(_) => warn!(pid = ?pid, "Worker still not reaped after SIGKILL"),
        }
        SupervisionOutcome::Killed
    }
}
