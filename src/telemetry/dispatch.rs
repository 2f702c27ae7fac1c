//! Dispatch span helpers.
//!
//! One span per delivered item, covering processing and acknowledgement.

use tracing::Span;

/// Start a span for handling one delivered item.
///
/// The `item.outcome` field is declared empty and filled in via
/// [`record_outcome`] once processing resolves.
pub fn start_item_span(worker_id: u32, url: &str) -> Span {
    tracing::info_span!(
        "item.handle",
        "item.worker_id" = worker_id,
        "item.url" = url,
        "item.outcome" = tracing::field::Empty,
    )
}

/// Record how handling resolved ("completed" | "failed") on the current
/// span.
pub fn record_outcome(outcome: &str) {
    Span::current().record("item.outcome", outcome);
}
