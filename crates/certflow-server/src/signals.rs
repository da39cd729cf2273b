//! Shutdown signals for the dashboard server.
//!
//! SIGTERM and SIGINT (Ctrl+C elsewhere) flip a watch channel; the server
//! drains in-flight requests once it flips. A batch in progress runs to the
//! end of its current request, so its outcomes are still written back.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Listens for termination signals.
#[derive(Debug)]
pub struct SignalHandler {
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Spawns the listener task. Call once at startup.
    pub fn spawn_listener(&self) {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            match termination().await {
                Some(name) => {
                    info!(signal = name, "shutting down");
                    let _ = shutdown_tx.send(true);
                }
                None => debug!("signal listener stopped without a signal"),
            }
        });
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// A future that completes once shutdown is signaled.
    pub fn shutdown(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_rx.clone(),
        }
    }
}

/// Resolves with the name of the first termination signal received, or
/// `None` when the handlers cannot be installed.
#[cfg(unix)]
async fn termination() -> Option<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let installed = signal(SignalKind::terminate()).and_then(|term| {
        signal(SignalKind::interrupt()).map(|int| (term, int))
    });
    let (mut sigterm, mut sigint) = match installed {
        Ok(pair) => pair,
        Err(e) => {
            warn!("cannot install signal handlers: {}", e);
            return None;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => Some("SIGTERM"),
        _ = sigint.recv() => Some("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn termination() -> Option<&'static str> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Some("Ctrl+C"),
        Err(e) => {
            warn!("cannot listen for Ctrl+C: {}", e);
            None
        }
    }
}

/// Completes when shutdown is signaled or the handler is dropped.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub async fn wait(mut self) {
        // `wait_for` also errors when the sender is gone; both mean stop.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_sets_flag() {
        let handler = SignalHandler::new();
        assert!(!handler.is_shutdown());
        handler.trigger_shutdown();
        assert!(handler.is_shutdown());
        handler.trigger_shutdown();
        assert!(handler.is_shutdown());
    }

    #[tokio::test]
    async fn dropped_handler_releases_waiters() {
        let handler = SignalHandler::new();
        let shutdown = handler.shutdown();
        drop(handler);
        let result = tokio::time::timeout(Duration::from_millis(50), shutdown.wait()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wait_completes_after_trigger() {
        let handler = SignalHandler::new();
        let shutdown = handler.shutdown();
        let tx = handler.shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });

        let result = tokio::time::timeout(Duration::from_millis(500), shutdown.wait()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_signaled() {
        let handler = SignalHandler::new();
        handler.trigger_shutdown();
        let result =
            tokio::time::timeout(Duration::from_millis(50), handler.shutdown().wait()).await;
        assert!(result.is_ok());
    }
}
