// Assignment Source Port
// Abstraction over the transport that delivers one assignment per connection

use crate::domain::Assignment;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Connection-level failures (connect, probe)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connect to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },
}

/// Failures while receiving one assignment
#[derive(Error, Debug)]
pub enum ReceiveError {
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("Connection closed before an address was received")]
    ClosedBeforeAddress,

    #[error("Address is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("Address not terminated within {limit} bytes")]
    Unterminated { limit: usize },

    #[error("Storage error: {0}")]
    Storage(#[source] std::io::Error),
}

impl ReceiveError {
    /// Coarse category used in log fields
    pub fn category(&self) -> &'static str {
        match self {
            ReceiveError::Transport(_) | ReceiveError::ClosedBeforeAddress => "transport",
            ReceiveError::Decode(_) | ReceiveError::Unterminated { .. } => "decode",
            ReceiveError::Storage(_) => "storage",
        }
    }
}

/// Connection factory for the fixed server endpoint
#[async_trait]
pub trait AssignmentSource: Send + Sync {
    /// Human readable endpoint (for logs)
    fn endpoint(&self) -> String;

    /// Connect once and disconnect immediately (startup reachability check)
    async fn probe(&self) -> Result<(), TransportError>;

    /// Open a fresh, single-use connection
    async fn connect(&self) -> Result<Box<dyn AssignmentChannel>, TransportError>;
}

/// One exclusively-owned connection, used for exactly one receive
#[async_trait]
pub trait AssignmentChannel: Send {
    /// Read the address token and the image blob; the image is stored at `image_path`
    ///
    /// # Errors
    /// - ReceiveError::Transport / ClosedBeforeAddress on socket failures
    /// - ReceiveError::Decode / Unterminated on a malformed address
    /// - ReceiveError::Storage if the image cannot be written
    async fn receive(&mut self, image_path: &Path) -> Result<Assignment, ReceiveError>;

    /// Release the connection. Calling it twice is a no-op.
    async fn close(&mut self);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::TargetAddress;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Ordered record of mock interactions, shareable between mocks
    pub type EventLog = Arc<Mutex<Vec<String>>>;

    pub fn event_log() -> EventLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// Scripted result of one `connect` call
    #[derive(Debug, Clone)]
    pub enum MockConnect {
        /// Connect is refused
        Refused,
        /// Connect succeeds, receive yields this target
        Deliver(String),
        /// Connect succeeds, receive fails with a decode error
        Garbled,
        /// Connect succeeds, peer closes before the address
        Hangup,
    }

    /// Mock assignment source replaying a script; defaults to `Refused` once exhausted
    pub struct MockAssignmentSource {
        script: Mutex<VecDeque<MockConnect>>,
        probe_ok: bool,
        events: EventLog,
    }

    impl MockAssignmentSource {
        pub fn new(script: Vec<MockConnect>) -> Self {
            Self::with_events(script, event_log())
        }

        pub fn with_events(script: Vec<MockConnect>, events: EventLog) -> Self {
            Self {
                script: Mutex::new(script.into()),
                probe_ok: true,
                events,
            }
        }

        pub fn unreachable() -> Self {
            Self {
                probe_ok: false,
                ..Self::new(Vec::new())
            }
        }

        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    fn refused(endpoint: String) -> TransportError {
        TransportError::Connect {
            endpoint,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        }
    }

    #[async_trait]
    impl AssignmentSource for MockAssignmentSource {
        fn endpoint(&self) -> String {
            "mock:0".to_string()
        }

        async fn probe(&self) -> Result<(), TransportError> {
            self.events.lock().unwrap().push("probe".to_string());
            if self.probe_ok {
                Ok(())
            } else {
                Err(refused(self.endpoint()))
            }
        }

        async fn connect(&self) -> Result<Box<dyn AssignmentChannel>, TransportError> {
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(MockConnect::Refused);
            self.events.lock().unwrap().push("connect".to_string());

            if let MockConnect::Refused = next {
                return Err(refused(self.endpoint()));
            }
            Ok(Box::new(MockChannel {
                script: next,
                events: Arc::clone(&self.events),
            }))
        }
    }

    struct MockChannel {
        script: MockConnect,
        events: EventLog,
    }

    #[async_trait]
    impl AssignmentChannel for MockChannel {
        async fn receive(&mut self, image_path: &Path) -> Result<Assignment, ReceiveError> {
            self.events.lock().unwrap().push("receive".to_string());
            match &self.script {
                MockConnect::Deliver(target) => Ok(Assignment::new(
                    TargetAddress::new(target.clone()),
                    image_path,
                    0,
                )),
                MockConnect::Garbled => Err(ReceiveError::Decode(
                    String::from_utf8(vec![0xff, 0xfe]).unwrap_err(),
                )),
                MockConnect::Hangup | MockConnect::Refused => Err(ReceiveError::ClosedBeforeAddress),
            }
        }

        async fn close(&mut self) {
            self.events.lock().unwrap().push("close".to_string());
        }
    }

    impl Drop for MockChannel {
        fn drop(&mut self) {
            if let Ok(mut events) = self.events.lock() {
                events.push("drop".to_string());
            }
        }
    }
}
