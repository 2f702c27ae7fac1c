//! Store-backed dispatcher.
//!
//! Three keys per queue: the pending list, the `:processing` in-flight
//! list, and the `:seen` dedup set. Admission with dedup runs as a Lua
//! script so the membership check and the dual insert cannot race;
//! delivery is a single BLMOVE so an item is never in limbo between the
//! two lists.

use super::{Admission, Dispatch};
use crate::error::Result;
use crate::model::{Delivery, QueueItem};
use crate::store::Store;
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Admit a payload unless its URL is already in the seen set.
/// KEYS[1] = seen set, KEYS[2] = pending list; ARGV[1] = url, ARGV[2] = payload.
const ADMIT_SCRIPT: &str = r"
    if redis.call('SISMEMBER', KEYS[1], ARGV[1]) == 1 then
        return 0
    end
    redis.call('SADD', KEYS[1], ARGV[1])
    redis.call('RPUSH', KEYS[2], ARGV[2])
    return 1
";

/// Production dispatcher backed by the shared store.
pub struct RedisDispatcher {
    store: Arc<Store>,
    pending_key: String,
    processing_key: String,
    seen_key: String,
    admit_script: redis::Script,
}

impl RedisDispatcher {
    pub fn new(store: Arc<Store>, queue_name: &str) -> Self {
        Self {
            store,
            pending_key: queue_name.to_string(),
            processing_key: format!("{queue_name}:processing"),
            seen_key: format!("{queue_name}:seen"),
            admit_script: redis::Script::new(ADMIT_SCRIPT),
        }
    }

    /// The store handle this dispatcher was constructed with.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

#[async_trait]
impl Dispatch for RedisDispatcher {
    async fn enqueue(&self, item: &QueueItem) -> Result<()> {
        self.store.rpush(&self.pending_key, &item.to_payload()).await?;
        metrics::items_admitted().add(1, &[KeyValue::new("result", "forced")]);
        Ok(())
    }

    async fn enqueue_with_dedup(&self, item: &QueueItem) -> Result<Admission> {
        let mut conn = self.store.connection().await;
        let admitted: i32 = self
            .admit_script
            .key(self.seen_key.as_str())
            .key(self.pending_key.as_str())
            .arg(item.url.as_str())
            .arg(item.to_payload())
            .invoke_async(&mut conn)
            .await?;

        if admitted == 1 {
            metrics::items_admitted().add(1, &[KeyValue::new("result", "ok")]);
            Ok(Admission::Admitted)
        } else {
            debug!(url = %item.url, "duplicate url rejected");
            metrics::items_admitted().add(1, &[KeyValue::new("result", "duplicate")]);
            Ok(Admission::Duplicate)
        }
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<Delivery>> {
        let payload = match self
            .store
            .blocking_move(&self.pending_key, &self.processing_key, timeout)
            .await?
        {
            Some(p) => p,
            None => return Ok(None),
        };

        match QueueItem::from_payload(&payload) {
            Ok(item) => Ok(Some(Delivery { item, payload })),
            Err(e) => {
                // Undecodable entries are dropped from the in-flight ledger,
                // not left to wedge it.
                warn!(error = %e, "skipping malformed queue payload");
                self.store.lrem(&self.processing_key, &payload).await?;
                Ok(None)
            }
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<()> {
        self.store.lrem(&self.processing_key, &delivery.payload).await?;
        self.store.srem(&self.seen_key, &delivery.item.url).await?;
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        self.store.llen(&self.pending_key).await
    }

    async fn in_flight(&self) -> Result<usize> {
        self.store.llen(&self.processing_key).await
    }

    async fn peek(&self) -> Result<Option<QueueItem>> {
        match self.store.lindex_head(&self.pending_key).await? {
            Some(payload) => QueueItem::from_payload(&payload).map(Some),
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<()> {
        self.store
            .del(&[
                self.pending_key.as_str(),
                self.processing_key.as_str(),
                self.seen_key.as_str(),
            ])
            .await
    }
}

impl std::fmt::Debug for RedisDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisDispatcher")
            .field("pending_key", &self.pending_key)
            .finish_non_exhaustive()
    }
}
