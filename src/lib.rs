//! # crawlq
//!
//! Redis-backed URL distribution for a crawl pipeline.
//!
//! Producers admit URLs through a deduplicating dispatcher, a pool of
//! concurrent workers pulls them with a blocking dequeue that atomically
//! records each item in flight, and a connection supervisor plus a
//! signal-driven shutdown coordinator keep the loop honest under store
//! outages and termination.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod shutdown;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod worker;
