// Application Layer - Agent loop and process supervision

pub mod agent;
pub mod constants;
pub mod reconnect;
pub mod stop;
pub mod supervisor;

// Re-exports
pub use agent::{Agent, AgentReport, AgentSettings, ConnectionLifetime, CycleOutcome};
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use stop::{stop_channel, StopHandle, StopToken};
pub use supervisor::{ProcessSupervisor, SupervisionOutcome, SupervisionPolicy, WaitMode};
