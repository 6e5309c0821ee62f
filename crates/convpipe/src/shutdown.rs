//! Shared cancellation signal.
//!
//! One [`Shutdown`] handle per pipeline; every task holds a
//! [`ShutdownListener`] and re-checks it at each suspension point. The
//! signal is level-triggered: a listener created after the trigger still
//! sees it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Trigger side of the cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Later calls are no-ops.
    pub fn trigger(&self, reason: &str) {
        if !self.tx.send_replace(true) {
            info!(reason, "shutdown triggered");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the cancellation signal.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once the signal has fired.
    ///
    /// Never resolves if every [`Shutdown`] handle is dropped untriggered.
    pub async fn recv(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}
