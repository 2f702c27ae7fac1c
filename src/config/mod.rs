//! Typed configuration from environment variables.
//!
//! Loads once at startup. Every option has a default matching a local
//! single-node crawl; a malformed value fails fast rather than being
//! silently replaced. Sensitive values wrapped in secrecy::SecretString
//! to prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: u32,
    pub redis_password: Option<SecretString>,
    pub queue_name: String,
    pub num_workers: u32,
    /// Max age of the last successful store probe before a worker re-checks
    /// connectivity.
    pub heartbeat_interval: Duration,
    /// Max age of the last status report before a worker refreshes it.
    pub status_interval: Duration,
    /// Blocking dequeue timeout. Also the worst-case shutdown latency.
    pub dequeue_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Base URL of the worker-status collaborator, if one is deployed.
    pub status_url: Option<String>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            redis_host: var_or("REDIS_HOST", "localhost"),
            redis_port: parsed_var("REDIS_PORT", 6379)?,
            redis_db: parsed_var("REDIS_DB", 0)?,
            redis_password: std::env::var("REDIS_PASSWORD").ok().map(SecretString::from),
            queue_name: var_or("QUEUE_NAME", "url_queue"),
            num_workers: parsed_var("NUM_WORKERS", 3)?,
            heartbeat_interval: seconds_var("HEARTBEAT_INTERVAL", 30)?,
            status_interval: seconds_var("STATUS_INTERVAL", 60)?,
            dequeue_timeout: seconds_var("DEQUEUE_TIMEOUT", 5)?,
            max_retries: parsed_var("MAX_RETRIES", 5)?,
            retry_delay: seconds_var("RETRY_DELAY", 2)?,
            status_url: std::env::var("STATUS_URL").ok(),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }

    /// Assemble the redis connection URL from host/port/db and the optional
    /// password.
    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password.expose_secret(),
                self.redis_host,
                self.redis_port,
                self.redis_db
            ),
            None => format!(
                "redis://{}:{}/{}",
                self.redis_host, self.redis_port, self.redis_db
            ),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}

fn seconds_var(name: &str, default: u64) -> Result<Duration> {
    parsed_var(name, default).map(Duration::from_secs)
}
