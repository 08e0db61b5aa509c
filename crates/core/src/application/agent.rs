// Agent loop: connect -> receive -> launch -> supervise, forever
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::reconnect::{ReconnectDecision, ReconnectPolicy};
use super::stop::StopToken;
use super::supervisor::{ProcessSupervisor, SupervisionOutcome};
use crate::domain::{Assignment, LaunchSpec, WorkerCommand};
use crate::error::{AppError, Result};
use crate::port::{AssignmentSource, ReceiveError, TransportError};

/// When the connection of a successful receive is released
///
/// Holding it keeps one socket open per supervision window; with a server
/// that does not close its side this is how sockets pile up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionLifetime {
    /// Close before the worker is launched
    #[default]
    CloseAfterReceive,
    /// Keep open through the supervision window, close at cycle end
    HoldUntilCycleEnd,
}

/// Per-cycle settings of the agent
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub image_path: PathBuf,
    pub worker: WorkerCommand,
    pub connection_lifetime: ConnectionLifetime,
    /// Stop after this many cycles (None = run forever)
    pub max_cycles: Option<u64>,
}

/// What happened in one cycle
#[derive(Debug)]
pub enum CycleOutcome {
    ConnectFailed(TransportError),
    NoAssignment(ReceiveError),
    Supervised {
        assignment: Assignment,
        outcome: SupervisionOutcome,
    },
}

/// Counters over a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReport {
    pub cycles: u64,
    pub assignments: u64,
    pub connect_failures: u64,
    pub receive_failures: u64,
    pub launch_failures: u64,
    pub signals_sent: u64,
}

impl AgentReport {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::ConnectFailed(_) => self.connect_failures += 1,
            CycleOutcome::NoAssignment(_) => self.receive_failures += 1,
            CycleOutcome::Supervised { outcome, .. } => {
                self.assignments += 1;
                if !outcome.launched() {
                    self.launch_failures += 1;
                }
                if outcome.signal_sent() {
                    self.signals_sent += 1;
                }
            }
        }
    }
}

/// The agent drives one cycle at a time on a single task
pub struct Agent {
    source: Arc<dyn AssignmentSource>,
    supervisor: ProcessSupervisor,
    reconnect: ReconnectPolicy,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(
        source: Arc<dyn AssignmentSource>,
        supervisor: ProcessSupervisor,
        reconnect: ReconnectPolicy,
        settings: AgentSettings,
    ) -> Self {
        Self {
            source,
            supervisor,
            reconnect,
            settings,
        }
    }

    /// Startup reachability check; failure is fatal
    pub async fn probe(&self) -> Result<()> {
        let endpoint = self.source.endpoint();
        info!(endpoint = %endpoint, "Trying test connect");

        if let Err(e) = self.source.probe().await {
            error!(endpoint = %endpoint, error = %e, "Test connect failed");
            return Err(AppError::Transport(e));
        }
        info!(endpoint = %endpoint, "Test connect succeeded");
        Ok(())
    }

    /// Probe, then run cycles until stopped, the cycle limit is reached, or
    /// connect failures exceed the reconnect policy
    pub async fn run(&self, mut stop: StopToken) -> Result<AgentReport> {
        self.probe().await?;

        let mut report = AgentReport::default();
        let mut consecutive_failures: u32 = 0;

        loop {
            if stop.is_stopped() {
                info!("Stop requested, leaving agent loop");
                break;
            }
            if let Some(max) = self.settings.max_cycles {
                if report.cycles >= max {
                    info!(max_cycles = %max, "Cycle limit reached");
                    break;
                }
            }

            let outcome = self.run_cycle().await;
            report.record(&outcome);

            let delay = match outcome {
                CycleOutcome::ConnectFailed(e) => {
                    consecutive_failures += 1;
                    match self.reconnect.decide(consecutive_failures) {
                        ReconnectDecision::Retry(delay) => delay,
                        ReconnectDecision::GiveUp => {
                            error!(
                                endpoint = %self.source.endpoint(),
                                consecutive_failures = %consecutive_failures,
                                error = %e,
                                "Giving up on server"
                            );
                            return Err(AppError::Transport(e));
                        }
                    }
                }
                CycleOutcome::NoAssignment(_) => {
                    consecutive_failures = 0;
                    match self.reconnect.after_receive_failure() {
                        Some(delay) => delay,
                        None => continue,
                    }
                }
                CycleOutcome::Supervised { .. } => {
                    consecutive_failures = 0;
                    continue;
                }
            };

            tokio::select! {
                _ = sleep(delay) => {},
                _ = stop.stopped() => {
                    info!("Stop requested during reconnect delay");
                    break;
                }
            }
        }

        info!(
            cycles = %report.cycles,
            assignments = %report.assignments,
            connect_failures = %report.connect_failures,
            receive_failures = %report.receive_failures,
            launch_failures = %report.launch_failures,
            signals_sent = %report.signals_sent,
            "Agent stopped"
        );
        Ok(report)
    }

    /// One connect -> receive -> launch -> supervise sequence
    pub async fn run_cycle(&self) -> CycleOutcome {
        let mut channel = match self.source.connect().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(endpoint = %self.source.endpoint(), error = %e, "Connect failed");
                return CycleOutcome::ConnectFailed(e);
            }
        };

        let assignment = match channel.receive(&self.settings.image_path).await {
            Ok(assignment) => assignment,
            Err(e) => {
                warn!(
                    category = e.category(),
                    error = %e,
                    "Receive failed, abandoning cycle"
                );
                channel.close().await;
                return CycleOutcome::NoAssignment(e);
            }
        };
        info!(
            target_address = %assignment.target,
            image_path = %assignment.image_path.display(),
            image_bytes = %assignment.image_bytes,
            "Assignment received"
        );

        let held = match self.settings.connection_lifetime {
            ConnectionLifetime::CloseAfterReceive => {
                channel.close().await;
                drop(channel);
                None
            }
            ConnectionLifetime::HoldUntilCycleEnd => Some(channel),
        };

        let spec = LaunchSpec::for_assignment(&self.settings.worker, &assignment);
        info!(target_address = %assignment.target, "Targeting");
        let outcome = self.supervisor.supervise(&spec).await;

        if let Some(mut channel) = held {
            channel.close().await;
        }

        CycleOutcome::Supervised {
            assignment,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::stop::stop_channel;
    use crate::application::supervisor::SupervisionPolicy;
    use crate::port::assignment_source::mocks::{event_log, MockAssignmentSource, MockConnect};
    use crate::port::process_launcher::mocks::{MockProcessLauncher, MockWorkerBehavior};
    use std::time::Duration;

    fn settings(max_cycles: Option<u64>) -> AgentSettings {
        AgentSettings {
            image_path: PathBuf::from("target_image.jpg"),
            worker: WorkerCommand::new("./result/bin/pixelpwnr"),
            connection_lifetime: ConnectionLifetime::CloseAfterReceive,
            max_cycles,
        }
    }

    fn agent(
        source: Arc<MockAssignmentSource>,
        launcher: Arc<MockProcessLauncher>,
        reconnect: ReconnectPolicy,
        settings: AgentSettings,
    ) -> Agent {
        let supervisor = ProcessSupervisor::new(
            launcher,
            SupervisionPolicy {
                window: Duration::from_secs(30),
                ..Default::default()
            },
        );
        Agent::new(source, supervisor, reconnect, settings)
    }

    fn deliver(target: &str) -> MockConnect {
        MockConnect::Deliver(target.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_assignment_flows_into_worker_args() {
        let source = Arc::new(MockAssignmentSource::new(vec![deliver("10.0.0.5:1234")]));
        let launcher = Arc::new(MockProcessLauncher::new(MockWorkerBehavior::ExitAfter(
            Duration::from_secs(2),
        )));
        let agent = agent(
            source,
            launcher.clone(),
            ReconnectPolicy::default(),
            settings(Some(1)),
        );

        let report = agent.run(StopToken::never()).await.unwrap();

        assert_eq!(report.cycles, 1);
        assert_eq!(report.assignments, 1);
        assert_eq!(report.signals_sent, 0);

        let launched = launcher.launched();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].args[0], "10.0.0.5:1234");
        assert_eq!(launched[0].args[1], "--image");
        assert!(launched[0].args[2].ends_with("target_image.jpg"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_failure_abandons_cycle_and_continues() {
        let source = Arc::new(MockAssignmentSource::new(vec![
            MockConnect::Garbled,
            MockConnect::Hangup,
            deliver("host:1"),
        ]));
        let launcher = Arc::new(MockProcessLauncher::new(MockWorkerBehavior::RunForever));
        let agent = agent(
            source.clone(),
            launcher.clone(),
            ReconnectPolicy::default(),
            settings(Some(3)),
        );

        let report = agent.run(StopToken::never()).await.unwrap();

        assert_eq!(report.receive_failures, 2);
        assert_eq!(report.assignments, 1);
        assert_eq!(report.signals_sent, 1);
        assert_eq!(launcher.launched().len(), 1);
        // Failed receives always release their connection
        let events = source.events();
        assert_eq!(
            &events[..7],
            &["probe", "connect", "receive", "close", "drop", "connect", "receive"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_does_not_stop_loop() {
        let source = Arc::new(MockAssignmentSource::new(vec![deliver("a:1"), deliver("b:2")]));
        let launcher = Arc::new(MockProcessLauncher::failing());
        let agent = agent(
            source,
            launcher.clone(),
            ReconnectPolicy::default(),
            settings(Some(2)),
        );

        let report = agent.run(StopToken::never()).await.unwrap();

        assert_eq!(report.cycles, 2);
        assert_eq!(report.launch_failures, 2);
        assert_eq!(launcher.launched()[1].args[0], "b:2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_is_fatal() {
        let source = Arc::new(MockAssignmentSource::unreachable());
        let launcher = Arc::new(MockProcessLauncher::new(MockWorkerBehavior::RunForever));
        let agent = agent(
            source.clone(),
            launcher.clone(),
            ReconnectPolicy::default(),
            settings(None),
        );

        let result = agent.run(StopToken::never()).await;

        assert!(matches!(result, Err(AppError::Transport(_))));
        assert_eq!(source.events(), vec!["probe"]);
        assert!(launcher.launched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_give_up_at_limit() {
        let source = Arc::new(MockAssignmentSource::new(Vec::new()));
        let launcher = Arc::new(MockProcessLauncher::new(MockWorkerBehavior::RunForever));
        let agent = agent(
            source.clone(),
            launcher,
            ReconnectPolicy::new(Duration::from_secs(1), Some(3)),
            settings(None),
        );
        let start = tokio::time::Instant::now();

        let result = agent.run(StopToken::never()).await;

        assert!(matches!(result, Err(AppError::Transport(_))));
        let connects = source.events().iter().filter(|e| *e == "connect").count();
        assert_eq!(connects, 3);
        // Two delays between three attempts
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_connect_resets_failure_count() {
        let source = Arc::new(MockAssignmentSource::new(vec![
            MockConnect::Refused,
            MockConnect::Refused,
            deliver("a:1"),
            MockConnect::Refused,
            MockConnect::Refused,
            deliver("b:2"),
        ]));
        let launcher = Arc::new(MockProcessLauncher::new(MockWorkerBehavior::ExitAfter(
            Duration::from_secs(1),
        )));
        let agent = agent(
            source,
            launcher,
            ReconnectPolicy::new(Duration::from_millis(10), Some(3)),
            settings(Some(6)),
        );

        let report = agent.run(StopToken::never()).await.unwrap();

        assert_eq!(report.connect_failures, 4);
        assert_eq!(report.assignments, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_cycle() {
        let source = Arc::new(MockAssignmentSource::new(vec![deliver("a:1")]));
        let launcher = Arc::new(MockProcessLauncher::new(MockWorkerBehavior::RunForever));
        let agent = agent(
            source,
            launcher.clone(),
            ReconnectPolicy::default(),
            settings(None),
        );
        let (handle, token) = stop_channel();
        handle.stop();

        let report = agent.run(token).await.unwrap();

        assert_eq!(report, AgentReport::default());
        assert!(launcher.launched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_reconnect_delay() {
        let source = Arc::new(MockAssignmentSource::new(Vec::new()));
        let launcher = Arc::new(MockProcessLauncher::new(MockWorkerBehavior::RunForever));
        let agent = agent(
            source,
            launcher,
            ReconnectPolicy::new(Duration::from_secs(3600), None),
            settings(None),
        );
        let (handle, token) = stop_channel();

        let (report, _) = tokio::join!(agent.run(token), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.stop();
        });

        assert_eq!(report.unwrap().connect_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_window_still_signals_worker() {
        let source = Arc::new(MockAssignmentSource::new(vec![deliver("a:1"), deliver("b:2")]));
        let launcher = Arc::new(MockProcessLauncher::new(MockWorkerBehavior::RunForever));
        let agent = agent(
            source,
            launcher.clone(),
            ReconnectPolicy::default(),
            settings(None),
        );
        let (handle, token) = stop_channel();
        let start = tokio::time::Instant::now();

        let (report, _) = tokio::join!(agent.run(token), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            handle.stop();
        });

        let report = report.unwrap();
        assert_eq!(report.cycles, 1);
        assert_eq!(report.signals_sent, 1);
        assert_eq!(launcher.events(), vec!["launch", "terminate"]);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_failure_delay_paces_reconnects() {
        let source = Arc::new(MockAssignmentSource::new(vec![
            MockConnect::Hangup,
            MockConnect::Hangup,
            deliver("a:1"),
        ]));
        let launcher = Arc::new(MockProcessLauncher::new(MockWorkerBehavior::ExitAfter(
            Duration::ZERO,
        )));
        let reconnect =
            ReconnectPolicy::default().with_receive_failure_delay(Duration::from_secs(2));
        let agent = agent(source, launcher.clone(), reconnect, settings(Some(3)));
        let start = tokio::time::Instant::now();

        let report = agent.run(StopToken::never()).await.unwrap();

        assert_eq!(report.receive_failures, 2);
        assert_eq!(report.assignments, 1);
        // Two pauses, then the full window of the delivered assignment
        assert_eq!(start.elapsed(), Duration::from_secs(34));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_after_receive_releases_before_launch() {
        let events = event_log();
        let source = Arc::new(MockAssignmentSource::with_events(
            vec![deliver("a:1")],
            events.clone(),
        ));
        let launcher = Arc::new(MockProcessLauncher::with_events(
            MockWorkerBehavior::RunForever,
            events.clone(),
        ));
        let agent = agent(source, launcher, ReconnectPolicy::default(), settings(Some(1)));

        agent.run(StopToken::never()).await.unwrap();

        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["probe", "connect", "receive", "close", "drop", "launch", "terminate"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_until_cycle_end_keeps_connection_through_window() {
        let events = event_log();
        let source = Arc::new(MockAssignmentSource::with_events(
            vec![deliver("a:1")],
            events.clone(),
        ));
        let launcher = Arc::new(MockProcessLauncher::with_events(
            MockWorkerBehavior::RunForever,
            events.clone(),
        ));
        let settings = AgentSettings {
            connection_lifetime: ConnectionLifetime::HoldUntilCycleEnd,
            ..settings(Some(1))
        };
        let agent = agent(source, launcher, ReconnectPolicy::default(), settings);

        agent.run(StopToken::never()).await.unwrap();

        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["probe", "connect", "receive", "launch", "terminate", "close", "drop"]
        );
    }
}
