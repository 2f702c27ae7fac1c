//! Core data model.
//!
//! A queue item is a URL waiting to be crawled, plus whatever opaque
//! metadata the producer attached. Identity is the URL itself; an item is
//! immutable once admitted and held by exactly one worker per dispatch
//! cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Queue Item
// ---------------------------------------------------------------------------

/// A unit of work: one URL and optional producer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub url: String,

    /// Arbitrary JSON attached by the producer. The dispatcher doesn't
    /// interpret this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl QueueItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metadata: None,
        }
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Serialize to the wire payload stored in the queue.
    pub fn to_payload(&self) -> String {
        // Serialization of url + Value cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a wire payload read back from the queue.
    pub fn from_payload(payload: &str) -> crate::error::Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| crate::error::Error::MalformedPayload(format!("{e}: {payload}")))
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// An item handed to a worker, paired with the exact payload bytes it was
/// stored as. Acknowledge removes that payload from the in-flight ledger,
/// so the pairing must survive until then.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub item: QueueItem,
    pub payload: String,
}

// ---------------------------------------------------------------------------
// Worker Heartbeat
// ---------------------------------------------------------------------------

/// Liveness record for one worker, upserted periodically and read by the
/// external monitor. Never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: u32,
    pub last_seen: DateTime<Utc>,
}

impl WorkerHeartbeat {
    /// Seconds elapsed since this worker last reported.
    pub fn staleness(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_seen).num_seconds()
    }
}
