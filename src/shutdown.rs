//! Shutdown coordination.
//!
//! A watch channel carries the cooperative stop flag: the coordinator owns
//! the sender, every worker loop holds a receiver and checks it at the top
//! of each iteration. Worst-case shutdown latency is therefore one dequeue
//! timeout. Workers are never force-interrupted; one mid-flight processing
//! call is allowed to finish.

use tokio::sync::watch;
use tracing::info;

/// Owns the stop flag and the signal listener.
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A receiver for one worker loop.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Flip the stop flag. Idempotent.
    pub fn request_stop(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Spawn a task that flips the stop flag on SIGINT or SIGTERM.
    pub fn listen_for_signals(&self) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            wait_for_termination_signal().await;
            info!("termination signal received, requesting stop");
            let _ = tx.send(true);
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => {
            tokio::signal::ctrl_c().await.ok();
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    tokio::signal::ctrl_c().await.ok();
}
