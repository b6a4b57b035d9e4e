//! Ingestion endpoint handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::envelope::{ApiError, IngestAck};
use crate::ingest::IngestSender;
use crate::types::MetricRecord;

/// Shared state for the ingestion routes.
#[derive(Debug, Clone)]
pub struct IngestState {
    pub queue: IngestSender,
}

/// `POST /post_metrics`: enqueue one record for the monitor.
pub async fn post_metrics(
    State(state): State<IngestState>,
    body: Result<Json<MetricRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestAck>), ApiError> {
    let Json(record) = body.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "[API] Rejected metric body");
        ApiError::BadRequest(rejection.body_text())
    })?;

    let turbine_id = record.turbine_id;
    state.queue.send(record).map_err(|_| ApiError::Unavailable)?;
    debug!(turbine_id, "[API] Record enqueued");

    Ok((StatusCode::OK, Json(IngestAck::new(turbine_id))))
}

/// `GET /health`
pub async fn health(State(state): State<IngestState>) -> (StatusCode, Json<Value>) {
    if state.queue.is_closed() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
    } else {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    }
}
