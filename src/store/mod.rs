//! Queue store client: a thin adapter over Redis list/set/hash primitives.
//!
//! Owns the connection handle shared by every dispatcher operation and no
//! business logic. The connection can be replaced in place after an outage
//! (see [`Store::reconnect`]); clones taken before the swap fail fast and
//! the next probe picks up the fresh handle.

use crate::error::Result;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Direction};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Store handle. Owns the redis client and the live connection.
pub struct Store {
    client: redis::Client,
    conn: RwLock<MultiplexedConnection>,
}

impl Store {
    /// Open a client and establish the initial connection.
    ///
    /// This is a single attempt; bounded-retry construction belongs to the
    /// connection supervisor.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            client,
            conn: RwLock::new(conn),
        })
    }

    /// Replace the live connection with a freshly established one.
    pub async fn reconnect(&self) -> Result<()> {
        let fresh = self.client.get_multiplexed_async_connection().await?;
        *self.conn.write().await = fresh;
        record("reconnect");
        Ok(())
    }

    /// Liveness probe — a bare PING.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Clone the live connection for a single operation.
    ///
    /// MultiplexedConnection clones share the underlying link, so this is
    /// cheap and safe to call per operation.
    pub(crate) async fn connection(&self) -> MultiplexedConnection {
        self.conn.read().await.clone()
    }

    // -- list primitives ----------------------------------------------------

    /// Append a value to the tail of a list.
    pub async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection().await;
        conn.rpush::<_, _, ()>(key, value).await?;
        record("rpush");
        Ok(())
    }

    /// Atomically pop the head of `src` and append it to the tail of `dst`,
    /// blocking up to `timeout`. Returns None if nothing arrived in time.
    pub async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let mut conn = self.connection().await;
        let moved: Option<String> = conn
            .blmove(src, dst, Direction::Left, Direction::Right, timeout.as_secs_f64())
            .await?;
        record(if moved.is_some() { "blmove" } else { "blmove_empty" });
        Ok(moved)
    }

    /// Remove the first occurrence of `value` from a list. Returns how many
    /// entries were removed (0 or 1) — removing an absent value is a no-op.
    pub async fn lrem(&self, key: &str, value: &str) -> Result<usize> {
        let mut conn = self.connection().await;
        let removed: usize = conn.lrem(key, 1, value).await?;
        record("lrem");
        Ok(removed)
    }

    pub async fn llen(&self, key: &str) -> Result<usize> {
        let mut conn = self.connection().await;
        Ok(conn.llen(key).await?)
    }

    /// Read the head of a list without removing it.
    pub async fn lindex_head(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await;
        Ok(conn.lindex(key, 0).await?)
    }

    // -- set primitives -----------------------------------------------------

    pub async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.connection().await;
        conn.sadd::<_, _, ()>(key, member).await?;
        record("sadd");
        Ok(())
    }

    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.connection().await;
        Ok(conn.sismember(key, member).await?)
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.connection().await;
        conn.srem::<_, _, ()>(key, member).await?;
        record("srem");
        Ok(())
    }

    pub async fn scard(&self, key: &str) -> Result<usize> {
        let mut conn = self.connection().await;
        Ok(conn.scard(key).await?)
    }

    // -- hash primitives (heartbeat map) ------------------------------------

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.connection().await;
        conn.hset::<_, _, _, ()>(key, field, value).await?;
        record("hset");
        Ok(())
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.connection().await;
        Ok(conn.hgetall(key).await?)
    }

    // -- keyspace -----------------------------------------------------------

    /// Delete the given keys outright.
    pub async fn del(&self, keys: &[&str]) -> Result<()> {
        let mut conn = self.connection().await;
        conn.del::<_, ()>(keys).await?;
        record("del");
        Ok(())
    }
}

fn record(operation: &'static str) {
    metrics::store_operations().add(1, &[KeyValue::new("operation", operation)]);
}
