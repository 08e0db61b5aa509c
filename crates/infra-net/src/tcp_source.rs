// TCP implementation of the AssignmentSource port
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use pixagent_core::application::constants::DEFAULT_CONNECT_TIMEOUT;
use pixagent_core::domain::Assignment;
use pixagent_core::port::{AssignmentChannel, AssignmentSource, ReceiveError, TransportError};

use crate::receiver::{receive_assignment, AddressFraming};

/// Connects to the fixed server endpoint, one connection per cycle
pub struct TcpAssignmentSource {
    host: String,
    port: u16,
    connect_timeout: Duration,
    framing: AddressFraming,
}

impl TcpAssignmentSource {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            framing: AddressFraming::default(),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_framing(mut self, framing: AddressFraming) -> Self {
        self.framing = framing;
        self
    }

    async fn open(&self) -> Result<TcpStream, TransportError> {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(TransportError::Connect {
                endpoint: self.endpoint(),
                source,
            }),
            Err(_) => Err(TransportError::Timeout {
                endpoint: self.endpoint(),
                timeout_ms: self.connect_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl AssignmentSource for TcpAssignmentSource {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn probe(&self) -> Result<(), TransportError> {
        let mut stream = self.open().await?;
        if let Err(e) = stream.shutdown().await {
            debug!(endpoint = %self.endpoint(), error = %e, "Probe shutdown failed, dropping connection");
        }
        Ok(())
    }

    async fn connect(&self) -> Result<Box<dyn AssignmentChannel>, TransportError> {
        let stream = self.open().await?;
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| self.endpoint());
        info!(peer = %peer, "Connected");

        Ok(Box::new(TcpChannel {
            stream: Some(stream),
            framing: self.framing,
            peer,
        }))
    }
}

/// A single-use connection to the server
pub struct TcpChannel {
    stream: Option<TcpStream>,
    framing: AddressFraming,
    peer: String,
}

impl TcpChannel {
    pub fn new(stream: TcpStream, framing: AddressFraming) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        Self {
            stream: Some(stream),
            framing,
            peer,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait]
impl AssignmentChannel for TcpChannel {
    async fn receive(&mut self, image_path: &Path) -> Result<Assignment, ReceiveError> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            ReceiveError::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection already closed",
            ))
        })?;
        receive_assignment(stream, self.framing, image_path).await
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(peer = %self.peer, error = %e, "Shutdown failed, dropping connection");
            }
            debug!(peer = %self.peer, "Connection closed");
        }
    }
}
