//! Axum router and server loop.

use axum::extract::multipart::Multipart;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::error::ApiError;
use crate::health::{HealthReport, check_health};
use crate::rag::{IngestReport, Query};
use crate::services::RagServices;

pub type SharedServices = Arc<RagServices>;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub query_id: String,
}

/// Build the HTTP router.
pub fn router(services: SharedServices) -> Router {
    let body_limit = services.config.server.max_upload_mb.saturating_mul(1024 * 1024);
    Router::new()
        .route("/ingest", post(ingest_handler))
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(services)
}

/// Upload a `.pdf` or `.txt` document in the multipart field `file`.
async fn ingest_handler(
    State(services): State<SharedServices>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
        let report = services.ingest.ingest(&filename, bytes.to_vec()).await?;
        return Ok(Json(report));
    }
    Err(ApiError::bad_request("No file provided."))
}

async fn query_handler(
    State(services): State<SharedServices>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let top_k = request
        .top_k
        .unwrap_or(services.config.query.default_top_k);
    let query = Query::new(request.question, top_k)?;

    let answer = services.query.answer(query).await?;
    Ok(Json(QueryResponse {
        answer: answer.answer,
        sources: answer.sources,
        query_id: answer.query_id,
    }))
}

async fn health_handler(State(services): State<SharedServices>) -> Json<HealthReport> {
    Json(check_health(&services).await)
}

/// Serve until Ctrl-C.
pub async fn run(services: SharedServices, host: &str, port: u16) -> Result<(), std::io::Error> {
    let app = router(services);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "RAGScope gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("RAGScope gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
