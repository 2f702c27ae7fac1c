//! Worker pool tests over the in-memory dispatcher.

use async_trait::async_trait;
use crawlq::dispatch::{Dispatch, MemoryDispatcher};
use crawlq::error::{Error, Result};
use crawlq::model::QueueItem;
use crawlq::shutdown::ShutdownCoordinator;
use crawlq::worker::{Processor, WorkerConfig, WorkerPool};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Records every URL it is handed; fails the ones it is told to fail.
struct RecordingProcessor {
    processed: Mutex<Vec<String>>,
    fail_urls: HashSet<String>,
}

impl RecordingProcessor {
    fn new() -> Self {
        Self {
            processed: Mutex::new(Vec::new()),
            fail_urls: HashSet::new(),
        }
    }

    fn failing_on(urls: &[&str]) -> Self {
        Self {
            processed: Mutex::new(Vec::new()),
            fail_urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Processor for RecordingProcessor {
    async fn process(&self, item: &QueueItem) -> Result<()> {
        self.processed.lock().await.push(item.url.clone());
        if self.fail_urls.contains(&item.url) {
            return Err(Error::Other(format!("induced failure for {}", item.url)));
        }
        Ok(())
    }
}

fn fast_config(num_workers: u32) -> WorkerConfig {
    WorkerConfig {
        num_workers,
        heartbeat_interval: Duration::from_secs(3600),
        status_interval: Duration::from_secs(3600),
        dequeue_timeout: Duration::from_millis(200),
        idle_sleep: Duration::from_millis(20),
    }
}

async fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: AsyncFnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !condition().await {
        assert!(Instant::now() < deadline, "condition not met within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn each_item_is_delivered_to_exactly_one_worker() {
    let dispatcher = Arc::new(MemoryDispatcher::new());
    let processor = Arc::new(RecordingProcessor::new());
    let shutdown = Arc::new(ShutdownCoordinator::new());

    let urls: Vec<String> = (0..20).map(|i| format!("http://site{i}.com")).collect();
    for url in &urls {
        dispatcher
            .enqueue_with_dedup(&QueueItem::new(url))
            .await
            .unwrap();
    }

    let pool = WorkerPool::new(dispatcher.clone(), processor.clone(), fast_config(4));
    let pool_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { pool.run(&shutdown).await })
    };

    wait_until(Duration::from_secs(5), async || {
        processor.processed.lock().await.len() >= 20
    })
    .await;

    shutdown.request_stop();
    pool_handle.await.unwrap().unwrap();

    let processed = processor.processed.lock().await;
    assert_eq!(processed.len(), 20, "no item processed twice");
    let distinct: HashSet<&String> = processed.iter().collect();
    assert_eq!(distinct.len(), 20);
    for url in &urls {
        assert!(distinct.contains(url));
    }

    // Everything acknowledged.
    assert_eq!(dispatcher.size().await.unwrap(), 0);
    assert_eq!(dispatcher.in_flight().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_items_stay_in_the_in_flight_ledger() {
    let dispatcher = Arc::new(MemoryDispatcher::new());
    let processor = Arc::new(RecordingProcessor::failing_on(&["http://bad.com"]));
    let shutdown = Arc::new(ShutdownCoordinator::new());

    for url in ["http://good.com", "http://bad.com"] {
        dispatcher
            .enqueue_with_dedup(&QueueItem::new(url))
            .await
            .unwrap();
    }

    let pool = WorkerPool::new(dispatcher.clone(), processor.clone(), fast_config(1));
    let pool_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { pool.run(&shutdown).await })
    };

    wait_until(Duration::from_secs(5), async || {
        processor.processed.lock().await.len() >= 2
    })
    .await;

    shutdown.request_stop();
    pool_handle.await.unwrap().unwrap();

    // The failed item was not acknowledged and was not requeued.
    assert_eq!(dispatcher.size().await.unwrap(), 0);
    assert_eq!(dispatcher.in_flight().await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stop_request_halts_idle_workers_within_one_timeout() {
    let dispatcher = Arc::new(MemoryDispatcher::new());
    let processor = Arc::new(RecordingProcessor::new());
    let shutdown = Arc::new(ShutdownCoordinator::new());

    let config = WorkerConfig {
        dequeue_timeout: Duration::from_millis(300),
        ..fast_config(3)
    };
    let pool = WorkerPool::new(dispatcher, processor, config);
    let pool_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { pool.run(&shutdown).await })
    };

    // Let the workers reach their blocking dequeue before stopping.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stop_requested = Instant::now();
    shutdown.request_stop();

    let result = tokio::time::timeout(Duration::from_secs(2), pool_handle)
        .await
        .expect("pool did not stop in time")
        .unwrap();
    assert!(result.is_ok());
    // Bounded by the dequeue timeout plus scheduling slack.
    assert!(stop_requested.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn no_items_are_processed_after_stop() {
    let dispatcher = Arc::new(MemoryDispatcher::new());
    let processor = Arc::new(RecordingProcessor::new());
    let shutdown = Arc::new(ShutdownCoordinator::new());

    assert!(!shutdown.is_stop_requested());
    shutdown.request_stop();
    assert!(shutdown.is_stop_requested());

    dispatcher
        .enqueue_with_dedup(&QueueItem::new("http://late.com"))
        .await
        .unwrap();

    let pool = WorkerPool::new(dispatcher.clone(), processor.clone(), fast_config(2));
    pool.run(&shutdown).await.unwrap();

    assert!(processor.processed.lock().await.is_empty());
    assert_eq!(dispatcher.size().await.unwrap(), 1);
}
