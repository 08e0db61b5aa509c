// Port Layer - Interfaces for external dependencies

pub mod assignment_source;
pub mod process_launcher;

// Re-exports
pub use assignment_source::{AssignmentChannel, AssignmentSource, ReceiveError, TransportError};
pub use process_launcher::{
    LaunchError, ProcessLauncher, SupervisionError, WorkerExit, WorkerHandle,
};
