//! Metric instrument factories for crawlq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"crawlq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for crawlq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("crawlq")
}

/// Counter: items admitted to the pending queue.
/// Labels: `result` ("ok" | "duplicate" | "forced").
pub fn items_admitted() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.items.admitted")
        .with_description("Number of items admitted to the pending queue")
        .build()
}

/// Counter: items handed to the processing collaborator.
/// Labels: `result` ("ok" | "error").
pub fn items_processed() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.items.processed")
        .with_description("Number of items processed by workers")
        .build()
}

/// Histogram: processing duration in milliseconds.
pub fn processing_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("crawlq.processing.duration_ms")
        .with_description("Item processing duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: raw store operations (rpush, blmove, lrem, ...).
/// Labels: `operation`.
pub fn store_operations() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.store.operations")
        .with_description("Number of store operations")
        .build()
}

/// Counter: connection attempts made by the supervisor.
/// Labels: `phase` ("establish" | "recover").
pub fn reconnect_attempts() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.store.reconnect_attempts")
        .with_description("Store connection attempts, initial and recovery")
        .build()
}
