// pixagent Infrastructure - System Adapters
// Implements: ProcessLauncher, WorkerHandle

pub mod subprocess_launcher;

pub use subprocess_launcher::{ChildWorker, SubprocessLauncher};
