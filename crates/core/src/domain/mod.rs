// Domain Layer - Pure data passed between cycle phases

pub mod assignment;
pub mod launch;

// Re-exports
pub use assignment::{Assignment, TargetAddress};
pub use launch::{LaunchSpec, WorkerCommand, IMAGE_FLAG};
