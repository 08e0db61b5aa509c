// Agent stop token

use tokio::sync::watch;

/// Stop request observed by the agent between cycles
#[derive(Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    /// Token whose handle is already gone; it never fires
    pub fn never() -> Self {
        let (_, token) = stop_channel();
        token
    }

    /// Check if stop was requested
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until stop is requested. Pends forever once the handle is dropped.
    pub async fn stopped(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Stop sender
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Ask the agent to stop after the current cycle
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a stop channel
pub fn stop_channel() -> (StopHandle, StopToken) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopToken { rx })
}
