//! Graceful shutdown
//!
//! Signal handling plus a [`ShutdownCoordinator`] that tracks SPOE connection
//! tasks in a `JoinSet` and drains them within a deadline.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Tracks connection tasks and tells them when to stop.
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    tasks: JoinSet<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            tasks: JoinSet::new(),
        }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.shutdown_tx.subscribe(),
        }
    }

    /// Spawns a tracked task. The task receives its own [`ShutdownSignal`]
    /// and is expected to finish its current unit of work and return once
    /// the signal fires.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.reap();
        let future = task(self.subscribe());
        self.tasks.spawn(async move {
            future.await;
            debug!(task = name, "task completed");
        });
    }

    /// Drops the results of tasks that already finished.
    pub fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                warn!(error = %e, "task failed");
            }
        }
    }

    /// Signals every task, waits up to `timeout`, then aborts the rest.
    pub async fn shutdown(mut self, timeout: Duration) {
        info!(active = self.task_count(), "draining connections");
        let _ = self.shutdown_tx.send(());

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "task failed during shutdown");
                }
            }
        })
        .await;

        match drained {
            Ok(()) => info!("all connections drained"),
            Err(_) => {
                warn!(
                    remaining = self.task_count(),
                    "shutdown timeout reached, aborting remaining connections"
                );
                self.tasks.abort_all();
            }
        }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ShutdownSignal {
    receiver: broadcast::Receiver<()>,
}

impl ShutdownSignal {
    /// Resolves once shutdown starts or the coordinator is gone.
    pub async fn recv(&mut self) {
        let _ = self.receiver.recv().await;
    }
}

/// Waits for SIGTERM or SIGINT.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
