//! Worker status reporting and the heartbeat map.
//!
//! Workers report liveness either through the external status collaborator
//! (`POST /update_status`) or, when no collaborator is deployed, by writing
//! the same record the collaborator would: a unix-seconds timestamp under
//! the worker's id in the heartbeat hash. Either way the map is readable by
//! an external monitor and by `crawlq status`, and the core never deletes
//! entries — cleanup is an external concern.

use crate::error::Result;
use crate::model::WorkerHeartbeat;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Hash holding worker_id → last-seen unix seconds.
pub const HEARTBEAT_KEY: &str = "crawler_status";

/// HTTP client for the status collaborator.
pub struct StatusClient {
    http: reqwest::Client,
    base_url: String,
}

impl StatusClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// `POST /update_status {"worker_id": <id>}`. Only success/failure
    /// matters to the caller; the response body is ignored.
    pub async fn update_status(&self, worker_id: u32) -> Result<()> {
        self.http
            .post(format!("{}/update_status", self.base_url))
            .json(&json!({ "worker_id": worker_id }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// How a worker refreshes its heartbeat.
pub enum StatusReporter {
    /// Through the external collaborator endpoint.
    Http(StatusClient),
    /// Straight into the heartbeat hash, for deployments without the
    /// collaborator. Writes the record the collaborator would have written.
    Direct(Arc<Store>),
}

impl StatusReporter {
    pub async fn report(&self, worker_id: u32) -> Result<()> {
        match self {
            Self::Http(client) => client.update_status(worker_id).await?,
            Self::Direct(store) => {
                let now = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
                store
                    .hset(HEARTBEAT_KEY, &worker_id.to_string(), &format!("{now:.6}"))
                    .await?;
            }
        }
        debug!(worker_id, "heartbeat refreshed");
        Ok(())
    }
}

/// Read every worker's heartbeat out of the store.
///
/// Entries with unparseable ids or timestamps are skipped — the map is
/// shared with external writers and their garbage is not our crash.
pub async fn read_heartbeats(store: &Store) -> Result<Vec<WorkerHeartbeat>> {
    let raw = store.hgetall(HEARTBEAT_KEY).await?;
    let mut heartbeats: Vec<WorkerHeartbeat> = raw
        .into_iter()
        .filter_map(|(id, seen)| {
            let worker_id = id.parse().ok()?;
            let last_seen = parse_unix_seconds(&seen)?;
            Some(WorkerHeartbeat {
                worker_id,
                last_seen,
            })
        })
        .collect();
    heartbeats.sort_by_key(|hb| hb.worker_id);
    Ok(heartbeats)
}

fn parse_unix_seconds(raw: &str) -> Option<DateTime<Utc>> {
    let seconds: f64 = raw.parse().ok()?;
    DateTime::from_timestamp_micros((seconds * 1_000_000.0) as i64)
}
