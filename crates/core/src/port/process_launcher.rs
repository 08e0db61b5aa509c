// Process Launcher Port
// Abstraction for spawning and signalling the external worker

use crate::domain::LaunchSpec;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Worker could not be started
#[derive(Error, Debug)]
#[error("Failed to launch {program}: {source}")]
pub struct LaunchError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// Failures while polling or signalling a running worker
#[derive(Error, Debug)]
pub enum SupervisionError {
    #[error("Status poll failed: {0}")]
    Poll(String),

    #[error("{signal} failed: {reason}")]
    Signal { signal: &'static str, reason: String },

    #[error("Wait failed: {0}")]
    Wait(String),
}

/// How a worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// None if the worker was ended by a signal
    pub code: Option<i32>,
    pub success: bool,
}

impl WorkerExit {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            success: code == 0,
        }
    }

    pub fn signaled() -> Self {
        Self {
            code: None,
            success: false,
        }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Spawns workers
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start the worker without waiting for it
    ///
    /// # Errors
    /// - LaunchError if the binary is missing, not executable, or resources are exhausted
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn WorkerHandle>, LaunchError>;
}

/// Opaque handle bound to one spawned worker
///
/// Signals are only ever delivered through the handle, never by raw PID, so a
/// recycled PID cannot be hit after the worker has been reaped.
#[async_trait]
pub trait WorkerHandle: Send {
    /// OS process id while the worker is unreaped (for logs)
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check
    fn try_exit(&mut self) -> Result<Option<WorkerExit>, SupervisionError>;

    /// Wait for the worker to exit. Must be cancel-safe.
    async fn wait_exit(&mut self) -> Result<WorkerExit, SupervisionError>;

    /// Request graceful termination (SIGTERM)
    fn terminate(&mut self) -> Result<(), SupervisionError>;

    /// Force termination (SIGKILL)
    fn kill(&mut self) -> Result<(), SupervisionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::assignment_source::mocks::{event_log, EventLog};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Mock worker behavior (driven by tokio time, use with paused clocks)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockWorkerBehavior {
        /// Exit with code 0 after the given runtime
        ExitAfter(Duration),
        /// Run until signalled
        RunForever,
        /// Ignore SIGTERM, only SIGKILL stops it
        IgnoreTerm,
        /// Disappears right before it is signalled (signal reports an error)
        VanishOnSignal,
    }

    /// Mock launcher recording every launch
    pub struct MockProcessLauncher {
        behavior: Option<MockWorkerBehavior>,
        launched: Mutex<Vec<LaunchSpec>>,
        events: EventLog,
    }

    impl MockProcessLauncher {
        pub fn new(behavior: MockWorkerBehavior) -> Self {
            Self::with_events(behavior, event_log())
        }

        pub fn with_events(behavior: MockWorkerBehavior, events: EventLog) -> Self {
            Self {
                behavior: Some(behavior),
                launched: Mutex::new(Vec::new()),
                events,
            }
        }

        /// Every launch fails as if the binary did not exist
        pub fn failing() -> Self {
            Self {
                behavior: None,
                launched: Mutex::new(Vec::new()),
                events: event_log(),
            }
        }

        pub fn launched(&self) -> Vec<LaunchSpec> {
            self.launched.lock().unwrap().clone()
        }

        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessLauncher for MockProcessLauncher {
        async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn WorkerHandle>, LaunchError> {
            self.launched.lock().unwrap().push(spec.clone());
            let behavior = self.behavior.ok_or_else(|| LaunchError {
                program: spec.program.display().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;
            self.events.lock().unwrap().push("launch".to_string());

            Ok(Box::new(MockWorker {
                started: Instant::now(),
                behavior,
                terminated: false,
                killed: false,
                vanished: false,
                events: Arc::clone(&self.events),
            }))
        }
    }

    struct MockWorker {
        started: Instant,
        behavior: MockWorkerBehavior,
        terminated: bool,
        killed: bool,
        vanished: bool,
        events: EventLog,
    }

    impl MockWorker {
        fn exit_state(&self) -> Option<WorkerExit> {
            if self.killed || self.vanished {
                return Some(WorkerExit::signaled());
            }
            match self.behavior {
                MockWorkerBehavior::ExitAfter(runtime) if Instant::now() >= self.started + runtime => {
                    Some(WorkerExit::from_code(0))
                }
                MockWorkerBehavior::IgnoreTerm => None,
                _ if self.terminated => Some(WorkerExit::signaled()),
                _ => None,
            }
        }
    }

    #[async_trait]
    impl WorkerHandle for MockWorker {
        fn id(&self) -> Option<u32> {
            self.exit_state().is_none().then_some(4242)
        }

        fn try_exit(&mut self) -> Result<Option<WorkerExit>, SupervisionError> {
            Ok(self.exit_state())
        }

        async fn wait_exit(&mut self) -> Result<WorkerExit, SupervisionError> {
            if let Some(exit) = self.exit_state() {
                return Ok(exit);
            }
            match self.behavior {
                MockWorkerBehavior::ExitAfter(runtime) => {
                    tokio::time::sleep_until(self.started + runtime).await;
                    Ok(WorkerExit::from_code(0))
                }
                _ => std::future::pending().await,
            }
        }

        fn terminate(&mut self) -> Result<(), SupervisionError> {
            self.events.lock().unwrap().push("terminate".to_string());
            if self.behavior == MockWorkerBehavior::VanishOnSignal {
                self.vanished = true;
                return Err(SupervisionError::Signal {
                    signal: "SIGTERM",
                    reason: "ESRCH: No such process".to_string(),
                });
            }
            self.terminated = true;
            Ok(())
        }

        fn kill(&mut self) -> Result<(), SupervisionError> {
            self.events.lock().unwrap().push("kill".to_string());
            self.killed = true;
            Ok(())
        }
    }
}
