//! # Lifecycle
//!
//! Shutdown coordination. Anything holding a `ShutdownTrigger` can end the
//! run: the interrupt handler does so on Ctrl+C, tests call it directly.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Requests shutdown; cheap to clone
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Later calls are no-ops.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Waits for a `ShutdownTrigger`
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown was requested, immediately if it already was
    pub async fn wait(&mut self) {
        // Every trigger dropped counts as shutdown too
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

/// Trigger shutdown on SIGINT
pub fn spawn_interrupt_handler(trigger: ShutdownTrigger) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal (SIGINT), stopping test environment...");
                trigger.trigger();
            }
            Err(e) => error!("Failed to listen for interrupt signal: {}", e),
        }
    })
}
