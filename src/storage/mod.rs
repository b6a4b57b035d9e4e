//! Metric Persistence
//!
//! The monitor appends every ingested record through [`MetricStore`]. The
//! durable backend is a thin append-only JSON-lines writer; the in-memory
//! backend backs tests and dry runs.

mod metrics_log;

pub use metrics_log::{InMemoryMetricStore, JsonlMetricStore, MetricStore, StoreError};
