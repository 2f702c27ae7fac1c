//! Configuration loading tests.

use crawlq::config::Config;
use crawlq::config::secrets::SecretString;
use std::time::Duration;

#[test]
fn config_defaults_and_overrides() {
    // Defaults with nothing set.
    unsafe {
        for var in [
            "REDIS_HOST",
            "REDIS_PORT",
            "REDIS_DB",
            "REDIS_PASSWORD",
            "QUEUE_NAME",
            "NUM_WORKERS",
            "DEQUEUE_TIMEOUT",
            "MAX_RETRIES",
            "RETRY_DELAY",
        ] {
            std::env::remove_var(var);
        }
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.redis_host, "localhost");
    assert_eq!(config.redis_port, 6379);
    assert_eq!(config.redis_db, 0);
    assert_eq!(config.queue_name, "url_queue");
    assert_eq!(config.num_workers, 3);
    assert_eq!(config.dequeue_timeout, Duration::from_secs(5));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.retry_delay, Duration::from_secs(2));

    // Environment overrides.
    unsafe {
        std::env::set_var("REDIS_HOST", "queue.internal");
        std::env::set_var("REDIS_PORT", "6380");
        std::env::set_var("NUM_WORKERS", "8");
        std::env::set_var("DEQUEUE_TIMEOUT", "10");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.redis_host, "queue.internal");
    assert_eq!(config.redis_port, 6380);
    assert_eq!(config.num_workers, 8);
    assert_eq!(config.dequeue_timeout, Duration::from_secs(10));

    // A malformed value fails fast instead of being replaced.
    unsafe {
        std::env::set_var("REDIS_PORT", "not-a-port");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::remove_var("REDIS_HOST");
        std::env::remove_var("REDIS_PORT");
        std::env::remove_var("NUM_WORKERS");
        std::env::remove_var("DEQUEUE_TIMEOUT");
    }
}

#[test]
fn redis_url_includes_db_and_optional_password() {
    let mut config = Config {
        redis_host: "localhost".to_string(),
        redis_port: 6379,
        redis_db: 2,
        redis_password: None,
        queue_name: "url_queue".to_string(),
        num_workers: 3,
        heartbeat_interval: Duration::from_secs(30),
        status_interval: Duration::from_secs(60),
        dequeue_timeout: Duration::from_secs(5),
        max_retries: 5,
        retry_delay: Duration::from_secs(2),
        status_url: None,
        otel_endpoint: None,
        log_level: "info".to_string(),
    };
    assert_eq!(config.redis_url(), "redis://localhost:6379/2");

    config.redis_password = Some(SecretString::from("hunter2"));
    assert_eq!(config.redis_url(), "redis://:hunter2@localhost:6379/2");
}
