//! The worker pool: N independent dispatch loops over one shared dispatcher.
//!
//! Workers coordinate only through the store's atomic operations — there is
//! no shared mutable state between loops beyond the dispatcher handle, the
//! stop channel, and the connection supervisor.

mod processor;

pub use processor::{FetchProcessor, NoOpProcessor, Processor};

use crate::config::Config;
use crate::dispatch::Dispatch;
use crate::error::{Error, Result};
use crate::model::Delivery;
use crate::shutdown::ShutdownCoordinator;
use crate::status::StatusReporter;
use crate::supervisor::ConnectionSupervisor;
use crate::telemetry::{dispatch as spans, metrics};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, error, info, warn};

/// Loop timing knobs, usually sliced out of [`Config`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub num_workers: u32,
    /// Max age of the last successful store probe before re-checking.
    pub heartbeat_interval: Duration,
    /// Max age of the last status report before refreshing it.
    pub status_interval: Duration,
    pub dequeue_timeout: Duration,
    /// Nap between iterations when the queue is empty.
    pub idle_sleep: Duration,
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            num_workers: config.num_workers,
            heartbeat_interval: config.heartbeat_interval,
            status_interval: config.status_interval,
            dequeue_timeout: config.dequeue_timeout,
            idle_sleep: Duration::from_secs(1),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: 3,
            heartbeat_interval: Duration::from_secs(30),
            status_interval: Duration::from_secs(60),
            dequeue_timeout: Duration::from_secs(5),
            idle_sleep: Duration::from_secs(1),
        }
    }
}

/// The pool. Spawns the loops, joins them on shutdown, and escalates the
/// first fatal worker error after stopping the rest.
pub struct WorkerPool<D, P> {
    dispatcher: Arc<D>,
    processor: Arc<P>,
    supervisor: Option<Arc<ConnectionSupervisor>>,
    reporter: Option<Arc<StatusReporter>>,
    config: WorkerConfig,
}

impl<D, P> WorkerPool<D, P>
where
    D: Dispatch + 'static,
    P: Processor + 'static,
{
    pub fn new(dispatcher: Arc<D>, processor: Arc<P>, config: WorkerConfig) -> Self {
        Self {
            dispatcher,
            processor,
            supervisor: None,
            reporter: None,
            config,
        }
    }

    /// Attach the connection supervisor (production pools; in-memory test
    /// pools run without one).
    pub fn with_supervisor(mut self, supervisor: Arc<ConnectionSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<StatusReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Run until the shutdown coordinator requests stop and every worker
    /// has exited its loop.
    ///
    /// A worker that returns an error (connection retries exhausted) stops
    /// the whole pool; the first such error is returned once all workers
    /// have been joined.
    pub async fn run(&self, shutdown: &ShutdownCoordinator) -> Result<()> {
        let mut workers = JoinSet::new();
        for id in 0..self.config.num_workers {
            let worker = Worker {
                id,
                dispatcher: Arc::clone(&self.dispatcher),
                processor: Arc::clone(&self.processor),
                supervisor: self.supervisor.clone(),
                reporter: self.reporter.clone(),
                config: self.config.clone(),
            };
            let stop = shutdown.subscribe();
            workers.spawn(worker.run(stop));
        }
        info!(num_workers = self.config.num_workers, "worker pool started");

        let mut fatal: Option<Error> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "worker terminated; stopping pool");
                    shutdown.request_stop();
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "worker task panicked; stopping pool");
                    shutdown.request_stop();
                    fatal.get_or_insert(Error::Other(format!("worker panicked: {e}")));
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => {
                info!("all workers stopped");
                Ok(())
            }
        }
    }
}

/// One dispatch loop's state.
struct Worker<D, P> {
    id: u32,
    dispatcher: Arc<D>,
    processor: Arc<P>,
    supervisor: Option<Arc<ConnectionSupervisor>>,
    reporter: Option<Arc<StatusReporter>>,
    config: WorkerConfig,
}

impl<D, P> Worker<D, P>
where
    D: Dispatch + 'static,
    P: Processor + 'static,
{
    async fn run(self, mut stop: watch::Receiver<bool>) -> Result<()> {
        info!(worker_id = self.id, "worker started");
        let mut last_probe = Instant::now();
        let mut last_status: Option<Instant> = None;

        while !*stop.borrow() {
            self.maybe_probe(&mut last_probe).await?;
            self.maybe_report(&mut last_status).await;

            match self
                .dispatcher
                .dequeue_blocking(self.config.dequeue_timeout)
                .await
            {
                Ok(Some(delivery)) => self.handle(delivery).await,
                Ok(None) => {
                    // Empty queue. Nap, but wake promptly on stop.
                    tokio::select! {
                        _ = stop.changed() => {}
                        _ = tokio::time::sleep(self.config.idle_sleep) => {}
                    }
                }
                Err(e) => {
                    warn!(worker_id = self.id, error = %e, "dequeue failed");
                    match &self.supervisor {
                        Some(supervisor) => {
                            supervisor.recover().await?;
                            last_probe = Instant::now();
                        }
                        None => tokio::time::sleep(self.config.idle_sleep).await,
                    }
                }
            }
        }

        info!(worker_id = self.id, "worker stopped");
        Ok(())
    }

    /// Re-check store connectivity once the last probe goes stale.
    /// Propagates `RetriesExhausted` — that ends this worker.
    async fn maybe_probe(&self, last_probe: &mut Instant) -> Result<()> {
        let Some(supervisor) = &self.supervisor else {
            return Ok(());
        };
        if last_probe.elapsed() >= self.config.heartbeat_interval {
            supervisor.probe().await?;
            *last_probe = Instant::now();
        }
        Ok(())
    }

    /// Refresh this worker's heartbeat once the last report goes stale.
    /// Failure is logged and non-fatal; it must not block dequeuing.
    async fn maybe_report(&self, last_status: &mut Option<Instant>) {
        let Some(reporter) = &self.reporter else {
            return;
        };
        let stale = last_status.is_none_or(|t| t.elapsed() >= self.config.status_interval);
        if stale {
            if let Err(e) = reporter.report(self.id).await {
                warn!(worker_id = self.id, error = %e, "status report failed");
            }
            *last_status = Some(Instant::now());
        }
    }

    async fn handle(&self, delivery: Delivery) {
        let span = spans::start_item_span(self.id, &delivery.item.url);
        async {
            let started = Instant::now();
            match self.processor.process(&delivery.item).await {
                Ok(()) => {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                    metrics::processing_duration_ms().record(elapsed_ms, &[]);
                    metrics::items_processed().add(1, &[KeyValue::new("result", "ok")]);
                    spans::record_outcome("completed");
                    match self.dispatcher.acknowledge(&delivery).await {
                        Ok(()) => {
                            info!(worker_id = self.id, url = %delivery.item.url, "processed url")
                        }
                        Err(e) => warn!(
                            worker_id = self.id,
                            url = %delivery.item.url,
                            error = %e,
                            "acknowledge failed; item stays in flight"
                        ),
                    }
                }
                Err(e) => {
                    metrics::items_processed().add(1, &[KeyValue::new("result", "error")]);
                    spans::record_outcome("failed");
                    // No automatic requeue — recovery of stuck items is an
                    // out-of-band sweep, not part of the hot loop.
                    error!(
                        worker_id = self.id,
                        url = %delivery.item.url,
                        error = %e,
                        "processing failed; leaving item in flight"
                    );
                }
            }
        }
        .instrument(span)
        .await
    }
}
