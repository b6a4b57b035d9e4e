//! HTTP ingestion server using Axum
//!
//! Receives telemetry from turbines running the HTTP sink and feeds it into
//! the same ingestion queue the in-process sink uses.

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::IngestState;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::defaults::INGEST_BODY_LIMIT_BYTES;
use crate::ingest::IngestSender;

/// Create the complete ingestion router.
pub fn create_app(queue: IngestSender) -> Router {
    routes::ingest_routes(IngestState { queue })
        .layer(RequestBodyLimitLayer::new(INGEST_BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
}

/// Serve the ingestion API on `listener` until `cancel` fires.
pub async fn serve(listener: TcpListener, queue: IngestSender, cancel: CancellationToken) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "[API] Ingestion server listening");

    axum::serve(listener, create_app(queue))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("[API] Ingestion server stopped");
    Ok(())
}
