//! API route definitions
//!
//! - POST /post_metrics - telemetry ingestion
//! - GET  /health       - liveness of the ingestion queue

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, IngestState};

pub fn ingest_routes(state: IngestState) -> Router {
    Router::new()
        .route("/post_metrics", post(handlers::post_metrics))
        .route("/health", get(handlers::health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingestion_queue;
    use crate::types::OperationalStatus;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/post_metrics")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_post_metrics_enqueues_record() {
        let (tx, mut rx) = ingestion_queue();
        let app = ingest_routes(IngestState { queue: tx });

        let response = app
            .oneshot(post(
                r#"{"turbine_number":3,"wind_speed":41.5,"power_output_in_kwh":1200.0,"operational_status":"broken","timestamp":1718000000.5}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["accepted"], true);
        assert_eq!(v["turbine_number"], 3);

        let record = rx.recv().await.unwrap();
        assert_eq!(record.turbine_id, 3);
        assert_eq!(record.status, OperationalStatus::Broken);
    }

    #[tokio::test]
    async fn test_post_metrics_rejects_bad_body() {
        let (tx, rx) = ingestion_queue();
        let app = ingest_routes(IngestState { queue: tx });

        let response = app
            .oneshot(post(r#"{"turbine_number":3,"operational_status":"on fire"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rx.backlog(), 0);
    }

    #[tokio::test]
    async fn test_post_metrics_when_monitor_gone() {
        let (tx, rx) = ingestion_queue();
        drop(rx);
        let app = ingest_routes(IngestState { queue: tx });

        let response = app
            .oneshot(post(
                r#"{"turbine_number":1,"wind_speed":1.0,"power_output_in_kwh":1.0,"operational_status":"ok","timestamp":0.0}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health() {
        let (tx, _rx) = ingestion_queue();
        let app = ingest_routes(IngestState { queue: tx });

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
