//! The dispatcher: admission, delivery, and acknowledgement of queue items.
//!
//! All ledger transitions go through here. Workers never touch the store
//! directly — they hold a dispatcher handle and call this operation set.

mod memory;
mod redis;

pub use self::memory::MemoryDispatcher;
pub use self::redis::RedisDispatcher;

use crate::error::Result;
use crate::model::{Delivery, QueueItem};
use async_trait::async_trait;
use std::time::Duration;

/// What happened when an item was admitted through the dedup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// New URL, appended to the pending queue.
    Admitted,
    /// URL already in the dedup ledger; nothing was enqueued.
    Duplicate,
}

/// The dispatcher operation set.
///
/// Implementations must make every structural transition a single atomic
/// store operation. In particular `dequeue_blocking` performs the
/// pending→in-flight move internally, as one indivisible step — there is
/// deliberately no separate "move to processing" call for a caller to
/// mis-sequence.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Append an item to the pending queue unconditionally.
    async fn enqueue(&self, item: &QueueItem) -> Result<()>;

    /// Admit an item unless its URL is already in the dedup ledger.
    /// The membership check and the dual insert are one logical step.
    async fn enqueue_with_dedup(&self, item: &QueueItem) -> Result<Admission>;

    /// Block until an item is available or `timeout` elapses. On delivery
    /// the item has already been recorded in the in-flight ledger.
    ///
    /// This is the system's only suspension point.
    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<Delivery>>;

    /// Retire a delivered item: drop it from the in-flight ledger and its
    /// URL from the dedup ledger. Acknowledging an absent item is a no-op.
    async fn acknowledge(&self, delivery: &Delivery) -> Result<()>;

    /// Number of items waiting in the pending queue.
    async fn size(&self) -> Result<usize>;

    /// Number of items currently checked out to workers.
    async fn in_flight(&self) -> Result<usize>;

    /// Head of the pending queue, without removing it.
    async fn peek(&self) -> Result<Option<QueueItem>>;

    /// Empty the pending queue, the in-flight ledger, and the dedup ledger
    /// together.
    async fn clear(&self) -> Result<()>;
}
