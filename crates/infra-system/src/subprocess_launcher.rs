// Subprocess launcher implementation
// reason: tokio::process for non-blocking spawn/wait, nix for signal delivery
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::debug;

use pixagent_core::domain::LaunchSpec;
use pixagent_core::port::{
    LaunchError, ProcessLauncher, SupervisionError, WorkerExit, WorkerHandle,
};

/// Spawns the worker as a child process
///
/// stdin is closed; stdout/stderr are inherited so worker output ends up
/// next to the agent's own logs. Workers are killed if their handle is
/// dropped (e.g. the agent task is aborted mid-window).
#[derive(Debug, Default, Clone)]
pub struct SubprocessLauncher;

impl SubprocessLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for SubprocessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn WorkerHandle>, LaunchError> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError {
                program: spec.program.display().to_string(),
                source,
            })?;

        debug!(pid = ?child.id(), program = %spec.program.display(), "Spawned worker");
        Ok(Box::new(ChildWorker { child }))
    }
}

/// Handle bound to one spawned child
///
/// Signals go to the child's PID only while the child is unreaped; once
/// `try_exit`/`wait_exit` has collected it, the PID is forgotten.
pub struct ChildWorker {
    child: Child,
}

impl ChildWorker {
    #[cfg(unix)]
    fn send_signal(&mut self, signal: nix::sys::signal::Signal) -> Result<(), SupervisionError> {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let signal_failed = |reason: String| SupervisionError::Signal {
            signal: signal.as_str(),
            reason,
        };

        let pid = self
            .child
            .id()
            .ok_or_else(|| signal_failed("worker already reaped".to_string()))?;
        let pid = i32::try_from(pid).map_err(|e| signal_failed(e.to_string()))?;

        debug!(pid = %pid, signal = %signal, "Sending signal");
        kill(Pid::from_raw(pid), signal).map_err(|e| signal_failed(e.to_string()))
    }
}

fn worker_exit(status: ExitStatus) -> WorkerExit {
    WorkerExit {
        code: status.code(),
        success: status.success(),
    }
}

#[async_trait]
impl WorkerHandle for ChildWorker {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit(&mut self) -> Result<Option<WorkerExit>, SupervisionError> {
        self.child
            .try_wait()
            .map(|status| status.map(worker_exit))
            .map_err(|e| SupervisionError::Poll(e.to_string()))
    }

    async fn wait_exit(&mut self) -> Result<WorkerExit, SupervisionError> {
        self.child
            .wait()
            .await
            .map(worker_exit)
            .map_err(|e| SupervisionError::Wait(e.to_string()))
    }

    fn terminate(&mut self) -> Result<(), SupervisionError> {
        #[cfg(unix)]
        {
            self.send_signal(nix::sys::signal::Signal::SIGTERM)
        }

        #[cfg(not(unix))]
        {
            // No graceful signal available, terminate hard
            self.child
                .start_kill()
                .map_err(|e| SupervisionError::Signal {
                    signal: "TerminateProcess",
                    reason: e.to_string(),
                })
        }
    }

    fn kill(&mut self) -> Result<(), SupervisionError> {
        #[cfg(unix)]
        {
            self.send_signal(nix::sys::signal::Signal::SIGKILL)
        }

        #[cfg(not(unix))]
        {
            self.child
                .start_kill()
                .map_err(|e| SupervisionError::Signal {
                    signal: "TerminateProcess",
                    reason: e.to_string(),
                })
        }
    }
}
