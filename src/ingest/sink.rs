//! Telemetry sinks: where a turbine agent sends its metric records.
//!
//! - [`QueueSink`]: straight into the in-process ingestion queue
//! - [`HttpSink`]: JSON POST to the monitor's `/post_metrics` endpoint

use async_trait::async_trait;
use std::time::Duration;

use super::queue::{IngestClosed, IngestSender};
use crate::retry::Transient;
use crate::types::MetricRecord;

/// Telemetry send errors
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Monitor returned status {0}")]
    ServerError(reqwest::StatusCode),
    #[error(transparent)]
    Closed(#[from] IngestClosed),
}

impl Transient for TelemetryError {
    fn is_transient(&self) -> bool {
        match self {
            // Timeouts, refused connections and 5xx may clear up; a 4xx
            // means the body itself is wrong and will be rejected again.
            TelemetryError::Http(_) => true,
            TelemetryError::ServerError(status) => !status.is_client_error(),
            TelemetryError::Closed(_) => false,
        }
    }
}

/// Destination for a turbine's telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync + 'static {
    /// Deliver one record. May suspend (e.g. on a network round trip).
    async fn send(&self, record: &MetricRecord) -> Result<(), TelemetryError>;

    /// Human-readable name for logging.
    fn sink_name(&self) -> &str;
}

// ============================================================================
// In-process queue
// ============================================================================

/// Hands records directly to the ingestion queue.
#[derive(Debug, Clone)]
pub struct QueueSink {
    queue: IngestSender,
}

impl QueueSink {
    pub fn new(queue: IngestSender) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl TelemetrySink for QueueSink {
    async fn send(&self, record: &MetricRecord) -> Result<(), TelemetryError> {
        self.queue.send(record.clone())?;
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "queue"
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Posts records to a monitor's ingestion endpoint.
#[derive(Clone)]
pub struct HttpSink {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    /// Build a sink for `monitor_url` with a fixed per-request timeout.
    pub fn new(monitor_url: &str, timeout: Duration) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/post_metrics", monitor_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    async fn send(&self, record: &MetricRecord) -> Result<(), TelemetryError> {
        let resp = self.http.post(&self.endpoint).json(record).send().await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TelemetryError::ServerError(resp.status()))
        }
    }

    fn sink_name(&self) -> &str {
        "http"
    }
}
