//! In-process dispatcher.
//!
//! Same contract as the store-backed dispatcher with no external
//! infrastructure, so the pool can be wired together and exercised in
//! tests. A single mutex plays the role the store's atomic operations play
//! in production; the bell wakes blocked dequeuers when work arrives.

use super::{Admission, Dispatch};
use crate::error::Result;
use crate::model::{Delivery, QueueItem};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

#[derive(Default)]
struct Ledgers {
    pending: VecDeque<String>,
    processing: Vec<String>,
    seen: HashSet<String>,
}

/// Dispatcher holding all three ledgers in process memory.
#[derive(Default)]
pub struct MemoryDispatcher {
    ledgers: Mutex<Ledgers>,
    bell: Notify,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the pending head and record it in flight, if anything is queued.
    async fn try_take(&self) -> Option<Delivery> {
        let mut ledgers = self.ledgers.lock().await;
        loop {
            let payload = ledgers.pending.pop_front()?;
            match QueueItem::from_payload(&payload) {
                Ok(item) => {
                    ledgers.processing.push(payload.clone());
                    return Some(Delivery { item, payload });
                }
                Err(e) => {
                    warn!(error = %e, "skipping malformed queue payload");
                }
            }
        }
    }
}

#[async_trait]
impl Dispatch for MemoryDispatcher {
    async fn enqueue(&self, item: &QueueItem) -> Result<()> {
        self.ledgers.lock().await.pending.push_back(item.to_payload());
        self.bell.notify_one();
        Ok(())
    }

    async fn enqueue_with_dedup(&self, item: &QueueItem) -> Result<Admission> {
        let mut ledgers = self.ledgers.lock().await;
        if !ledgers.seen.insert(item.url.clone()) {
            debug!(url = %item.url, "duplicate url rejected");
            return Ok(Admission::Duplicate);
        }
        ledgers.pending.push_back(item.to_payload());
        drop(ledgers);
        self.bell.notify_one();
        Ok(Admission::Admitted)
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.bell.notified();
            tokio::pin!(notified);
            // Register interest before the availability check, so an
            // enqueue landing between the two cannot be missed.
            notified.as_mut().enable();

            if let Some(delivery) = self.try_take().await {
                return Ok(Some(delivery));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<()> {
        let mut ledgers = self.ledgers.lock().await;
        if let Some(pos) = ledgers.processing.iter().position(|p| p == &delivery.payload) {
            ledgers.processing.remove(pos);
        }
        ledgers.seen.remove(&delivery.item.url);
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.ledgers.lock().await.pending.len())
    }

    async fn in_flight(&self) -> Result<usize> {
        Ok(self.ledgers.lock().await.processing.len())
    }

    async fn peek(&self) -> Result<Option<QueueItem>> {
        match self.ledgers.lock().await.pending.front() {
            Some(payload) => QueueItem::from_payload(payload).map(Some),
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut ledgers = self.ledgers.lock().await;
        ledgers.pending.clear();
        ledgers.processing.clear();
        ledgers.seen.clear();
        Ok(())
    }
}
