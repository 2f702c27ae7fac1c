//! The processing collaborator boundary.
//!
//! The pool hands each delivered item to a `Processor` and only cares
//! whether it succeeded. What processing *means* — fetching, extraction,
//! storage — lives behind this trait, including any fetch-level retry
//! policy.

use crate::error::Result;
use crate::model::QueueItem;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, item: &QueueItem) -> Result<()>;
}

/// Accepts every item without doing anything. Useful for wiring the pool
/// together and for draining a queue.
pub struct NoOpProcessor;

#[async_trait]
impl Processor for NoOpProcessor {
    async fn process(&self, item: &QueueItem) -> Result<()> {
        debug!(url = %item.url, "no-op processor accepted item");
        Ok(())
    }
}

/// Fetches the URL and discards the body. One attempt per dispatch; a
/// failed fetch surfaces as a processing failure.
pub struct FetchProcessor {
    http: reqwest::Client,
}

impl FetchProcessor {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("crawlq/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Processor for FetchProcessor {
    async fn process(&self, item: &QueueItem) -> Result<()> {
        let response = self.http.get(&item.url).send().await?.error_for_status()?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(url = %item.url, status = %status, bytes = body.len(), "fetched url");
        Ok(())
    }
}
