//! Telemetry ingestion path
//!
//! ```text
//! TurbineAgent ──TelemetrySink──▶ IngestSender ──▶ IngestReceiver ──▶ CentralMonitor
//!                   (queue | http → POST /post_metrics)
//! ```

mod queue;
mod sink;

pub use queue::{ingestion_queue, IngestClosed, IngestReceiver, IngestSender};
pub use sink::{HttpSink, QueueSink, TelemetryError, TelemetrySink};
