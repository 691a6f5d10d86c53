//! Graceful Shutdown Handler
//!
//! Per-listener shutdown coordination and process signal handling.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Shutdown coordinator for one listener.
///
/// Tracks in-flight connections and signals the accept loop to stop.
#[derive(Clone)]
pub struct ShutdownController {
    shutdown_tx: Arc<watch::Sender<bool>>,
    connections_tx: Arc<watch::Sender<usize>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (connections_tx, _) = watch::channel(0usize);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            connections_tx: Arc::new(connections_tx),
        }
    }

    /// Initiate shutdown. Only the first call has an effect.
    pub fn shutdown(&self) {
        let initiated = self.shutdown_tx.send_if_modified(|down| {
            let first = !*down;
            *down = true;
            first
        });
        if initiated {
            tracing::debug!("shutdown initiated");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|down| *down).await;
    }

    pub fn active_connections(&self) -> usize {
        *self.connections_tx.borrow()
    }

    /// Track a connection until the returned guard is dropped.
    pub fn connection_guard(&self) -> ConnectionGuard {
        self.connections_tx.send_modify(|n| *n += 1);
        ConnectionGuard {
            controller: self.clone(),
        }
    }

    /// Wait until every tracked connection has finished, up to `timeout`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let mut rx = self.connections_tx.subscribe();
        let drained = tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0))
            .await
            .map(|r| r.is_ok());
        match drained {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(
                    "drain timeout: {} connections still active",
                    self.active_connections()
                );
                false
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one in-flight connection.
pub struct ConnectionGuard {
    controller: ShutdownController,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.controller
            .connections_tx
            .send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Completes when the process receives Ctrl+C or SIGTERM.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }
}
