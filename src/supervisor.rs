//! Connection supervisor: bounded-retry reconnection to the shared store.
//!
//! Two states, Connected and Disconnected. Construction and every recovery
//! run the same procedure: up to `max_retries` attempts with a fixed delay
//! between them. Exhausting the retries is a hard error — the caller gets
//! `Error::RetriesExhausted`, never a handle that looks healthy.

use crate::error::{Error, Result};
use crate::store::Store;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// Explicit retry policy: attempt count and the fixed inter-attempt delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Store connectivity as last observed by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connected,
    Disconnected,
}

/// Supervises one store handle shared by the whole pool.
pub struct ConnectionSupervisor {
    store: Arc<Store>,
    policy: RetryPolicy,
    connected: AtomicBool,
}

impl ConnectionSupervisor {
    /// Establish the initial connection, retrying per `policy`.
    ///
    /// The process must not proceed without a live store, so exhaustion
    /// here is fatal to startup.
    pub async fn establish(url: &str, policy: RetryPolicy) -> Result<Self> {
        let mut last_error = String::new();
        for attempt in 1..=policy.max_retries {
            match Store::connect(url).await {
                Ok(store) => {
                    info!("connected to store");
                    return Ok(Self {
                        store: Arc::new(store),
                        policy,
                        connected: AtomicBool::new(true),
                    });
                }
                Err(e) => {
                    error!(
                        attempt,
                        max_retries = policy.max_retries,
                        error = %e,
                        "store connection attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
            metrics::reconnect_attempts().add(1, &[KeyValue::new("phase", "establish")]);
            if attempt < policy.max_retries {
                tokio::time::sleep(policy.retry_delay).await;
            }
        }
        error!("failed to connect to store after {} attempts", policy.max_retries);
        Err(Error::RetriesExhausted {
            attempts: policy.max_retries,
            last_error,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn state(&self) -> Connectivity {
        if self.connected.load(Ordering::Relaxed) {
            Connectivity::Connected
        } else {
            Connectivity::Disconnected
        }
    }

    /// Probe the store; on a failed probe, run the recovery procedure.
    pub async fn probe(&self) -> Result<()> {
        match self.store.ping().await {
            Ok(()) => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "store probe failed");
                self.recover().await
            }
        }
    }

    /// Bounded-retry reconnection. Call after any detected connectivity
    /// failure; returns only once the store answers a probe again, or with
    /// `RetriesExhausted` once the policy is spent.
    pub async fn recover(&self) -> Result<()> {
        self.connected.store(false, Ordering::Relaxed);
        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_retries {
            metrics::reconnect_attempts().add(1, &[KeyValue::new("phase", "recover")]);
            match self.try_reconnect().await {
                Ok(()) => {
                    info!(attempt, "store connection recovered");
                    self.connected.store(true, Ordering::Relaxed);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_retries = self.policy.max_retries,
                        error = %e,
                        "store reconnect attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
            if attempt < self.policy.max_retries {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }
        error!(
            "store unreachable after {} reconnect attempts",
            self.policy.max_retries
        );
        Err(Error::RetriesExhausted {
            attempts: self.policy.max_retries,
            last_error,
        })
    }

    async fn try_reconnect(&self) -> Result<()> {
        self.store.reconnect().await?;
        self.store.ping().await
    }
}
