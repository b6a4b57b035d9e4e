//! JSON bodies returned by the ingestion endpoint.
//!
//! Success: `{ "accepted": true, "turbine_number": 3, "received_at": "..." }`
//! Error:   `{ "error": { "code": "...", "message": "..." } }`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::types::TurbineId;

/// Acknowledgement for an accepted metric record.
#[derive(Debug, Serialize)]
pub struct IngestAck {
    pub accepted: bool,
    pub turbine_number: TurbineId,
    pub received_at: String,
}

impl IngestAck {
    pub fn new(turbine_number: TurbineId) -> Self {
        Self {
            accepted: true,
            turbine_number,
            received_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Errors the API reports to clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("monitor is not accepting records")]
    Unavailable,
}

impl ApiError {
    const fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}
