//! Store-backed dispatcher tests.
//!
//! All `#[ignore]`d — they require a running Redis. Point REDIS_URL at it
//! (defaults to local dev) and run with `--ignored`. Each test uses its own
//! queue name and clears it first, so they can run concurrently.

use crawlq::dispatch::{Admission, Dispatch, RedisDispatcher};
use crawlq::model::QueueItem;
use crawlq::status::{StatusReporter, read_heartbeats};
use crawlq::store::Store;
use crawlq::supervisor::{ConnectionSupervisor, Connectivity, RetryPolicy};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn test_dispatcher(queue_name: &str) -> RedisDispatcher {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".to_string());
    let store = Arc::new(Store::connect(&url).await.unwrap());
    let dispatcher = RedisDispatcher::new(store, queue_name);
    dispatcher.clear().await.unwrap();
    dispatcher
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn dedup_admission_via_script() {
    let dispatcher = test_dispatcher("test:dedup_admission").await;

    let first = dispatcher
        .enqueue_with_dedup(&QueueItem::new("http://a.com"))
        .await
        .unwrap();
    let second = dispatcher
        .enqueue_with_dedup(&QueueItem::new("http://a.com"))
        .await
        .unwrap();

    assert_eq!(first, Admission::Admitted);
    assert_eq!(second, Admission::Duplicate);
    assert_eq!(dispatcher.size().await.unwrap(), 1);

    // Admission dual-writes the dedup ledger.
    let store = dispatcher.store();
    assert!(
        store
            .sismember("test:dedup_admission:seen", "http://a.com")
            .await
            .unwrap()
    );
    assert_eq!(store.scard("test:dedup_admission:seen").await.unwrap(), 1);

    dispatcher.clear().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn externally_seeded_dedup_entry_blocks_admission() {
    let dispatcher = test_dispatcher("test:preseeded").await;

    dispatcher
        .store()
        .sadd("test:preseeded:seen", "http://known.com")
        .await
        .unwrap();

    let admission = dispatcher
        .enqueue_with_dedup(&QueueItem::new("http://known.com"))
        .await
        .unwrap();
    assert_eq!(admission, Admission::Duplicate);
    assert_eq!(dispatcher.size().await.unwrap(), 0);

    dispatcher.clear().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn dequeue_is_an_atomic_move_into_processing() {
    let dispatcher = test_dispatcher("test:atomic_move").await;

    dispatcher
        .enqueue_with_dedup(&QueueItem::new("http://a.com").metadata(json!({"depth": 1})))
        .await
        .unwrap();

    let delivery = dispatcher
        .dequeue_blocking(Duration::from_secs(1))
        .await
        .unwrap()
        .expect("should deliver");

    assert_eq!(delivery.item.url, "http://a.com");
    assert_eq!(dispatcher.size().await.unwrap(), 0);
    assert_eq!(dispatcher.in_flight().await.unwrap(), 1);

    dispatcher.acknowledge(&delivery).await.unwrap();
    assert_eq!(dispatcher.in_flight().await.unwrap(), 0);

    // Acknowledge also dropped the dedup entry: the url admits again.
    let again = dispatcher
        .enqueue_with_dedup(&QueueItem::new("http://a.com"))
        .await
        .unwrap();
    assert_eq!(again, Admission::Admitted);

    dispatcher.clear().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn dequeue_times_out_against_real_store() {
    let dispatcher = test_dispatcher("test:dequeue_timeout").await;

    let started = Instant::now();
    let delivery = dispatcher
        .dequeue_blocking(Duration::from_millis(500))
        .await
        .unwrap();

    assert!(delivery.is_none());
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn concurrent_dequeues_never_share_an_item() {
    let dispatcher = Arc::new(test_dispatcher("test:concurrent_dequeue").await);

    for i in 0..10 {
        dispatcher
            .enqueue_with_dedup(&QueueItem::new(format!("http://site{i}.com")))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            let mut urls = Vec::new();
            while let Some(delivery) = dispatcher
                .dequeue_blocking(Duration::from_millis(200))
                .await
                .unwrap()
            {
                urls.push(delivery.item.url.clone());
                dispatcher.acknowledge(&delivery).await.unwrap();
            }
            urls
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 10, "an item was delivered twice or lost");

    dispatcher.clear().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn malformed_payloads_are_skipped_not_fatal() {
    let dispatcher = test_dispatcher("test:malformed").await;

    // Inject garbage the way an external producer might.
    dispatcher
        .store()
        .rpush("test:malformed", "{not json")
        .await
        .unwrap();
    dispatcher
        .enqueue_with_dedup(&QueueItem::new("http://ok.com"))
        .await
        .unwrap();

    // First call eats the garbage and reports empty; second delivers.
    let first = dispatcher
        .dequeue_blocking(Duration::from_millis(500))
        .await
        .unwrap();
    assert!(first.is_none());
    assert_eq!(dispatcher.in_flight().await.unwrap(), 0, "garbage not left in flight");

    let second = dispatcher
        .dequeue_blocking(Duration::from_millis(500))
        .await
        .unwrap()
        .expect("real item should deliver");
    assert_eq!(second.item.url, "http://ok.com");

    dispatcher.clear().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn supervisor_probe_reports_connected() {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".to_string());
    let supervisor = ConnectionSupervisor::establish(&url, RetryPolicy::default())
        .await
        .unwrap();

    supervisor.probe().await.unwrap();
    assert_eq!(supervisor.state(), Connectivity::Connected);
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn direct_heartbeats_round_trip() {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".to_string());
    let store = Arc::new(Store::connect(&url).await.unwrap());

    let reporter = StatusReporter::Direct(store.clone());
    reporter.report(7).await.unwrap();

    let heartbeats = read_heartbeats(&store).await.unwrap();
    let mine = heartbeats
        .iter()
        .find(|hb| hb.worker_id == 7)
        .expect("worker 7 should have a heartbeat");
    assert!(mine.staleness(chrono::Utc::now()).abs() < 5);
}
