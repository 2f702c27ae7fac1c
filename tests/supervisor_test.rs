//! Connection supervisor tests.
//!
//! These use a port nothing listens on, so every attempt fails fast with
//! a refused connection.

use crawlq::error::Error;
use crawlq::supervisor::{ConnectionSupervisor, RetryPolicy};
use std::time::{Duration, Instant};

const UNREACHABLE: &str = "redis://127.0.0.1:1/0";

#[tokio::test]
async fn establish_exhausts_retries_then_fails_hard() {
    let policy = RetryPolicy {
        max_retries: 3,
        retry_delay: Duration::from_millis(100),
    };

    let started = Instant::now();
    let result = ConnectionSupervisor::establish(UNREACHABLE, policy).await;
    let elapsed = started.elapsed();

    match result {
        Err(Error::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        Err(other) => panic!("expected RetriesExhausted, got {other:?}"),
        Ok(_) => panic!("expected RetriesExhausted, got a connection"),
    }
    // Two inter-attempt delays for three attempts.
    assert!(elapsed >= Duration::from_millis(200), "returned early: {elapsed:?}");
}

#[tokio::test]
async fn establish_does_not_sleep_after_the_last_attempt() {
    let policy = RetryPolicy {
        max_retries: 1,
        retry_delay: Duration::from_secs(30),
    };

    let started = Instant::now();
    let result = ConnectionSupervisor::establish(UNREACHABLE, policy).await;

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(5));
}
