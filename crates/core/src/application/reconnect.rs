// Reconnect policy for failed connects
use std::time::Duration;
use tracing::{debug, info, warn};

use super::constants::DEFAULT_RECONNECT_DELAY;

/// Reconnect decision result
#[derive(Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Try again after the delay
    Retry(Duration),
    /// Too many consecutive failures, give up
    GiveUp,
}

/// Fixed-delay reconnect policy
///
/// There is no backoff: every failed connect waits the same delay. With no
/// failure limit the agent retries forever. Failed receives reconnect right
/// away unless a receive failure delay is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_consecutive_failures: Option<u32>,
    receive_failure_delay: Duration,
}

impl ReconnectPolicy {
    /// Create a new reconnect policy
    ///
    /// # Arguments
    /// * `delay` - Wait between a failed connect and the next attempt
    /// * `max_consecutive_failures` - Give up after this many failures in a row (None = never)
    pub fn new(delay: Duration, max_consecutive_failures: Option<u32>) -> Self {
        Self {
            delay,
            max_consecutive_failures,
            receive_failure_delay: Duration::ZERO,
        }
    }

    /// Pause before reconnecting after a failed receive
    pub fn with_receive_failure_delay(mut self, delay: Duration) -> Self {
        self.receive_failure_delay = delay;
        self
    }

    /// Delay before the next connect after a failed receive (None = reconnect now)
    pub fn after_receive_failure(&self) -> Option<Duration> {
        if self.receive_failure_delay.is_zero() {
            debug!("Reconnecting immediately after failed receive");
            return None;
        }
        debug!(
            delay_ms = %self.receive_failure_delay.as_millis(),
            "Pausing after failed receive"
        );
        Some(self.receive_failure_delay)
    }

    /// Decide what to do after `consecutive_failures` failed connects in a row
    pub fn decide(&self, consecutive_failures: u32) -> ReconnectDecision {
        if let Some(max) = self.max_consecutive_failures {
            if consecutive_failures >= max {
                warn!(
                    consecutive_failures = %consecutive_failures,
                    max_consecutive_failures = %max,
                    "Connect failure limit reached"
                );
                return ReconnectDecision::GiveUp;
            }
        }

        info!(
            consecutive_failures = %consecutive_failures,
            delay_ms = %self.delay.as_millis(),
            "Scheduling reconnect"
        );
        ReconnectDecision::Retry(self.delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY, None)
    }
}
