// Optional HTTP control surface: submit transcripts by hand, inspect metrics

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::error::ApiError;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{DispatchOutcome, PipelineHandle, TranscriptEvent};
use crate::validation::validate_transcript;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineHandle,
}

#[derive(Deserialize)]
pub struct TranscriptRequest {
    text: String,
}

#[derive(Serialize)]
pub struct TranscriptResponse {
    queued: bool,
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .into_inner();

    Router::new()
        .route("/health", get(health_check))
        .route("/transcript", post(submit_transcript))
        .route("/metrics", get(metrics_endpoint))
        .layer(middleware_stack)
        .with_state(state)
}

pub async fn serve(port: u16, state: AppState, request_timeout: Duration) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different CONTROL_PORT.")
    })?;

    info!("Control surface listening on http://{addr}");
    axum::serve(listener, router(state, request_timeout)).await?;
    Ok(())
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn submit_transcript(
    State(state): State<AppState>,
    Json(req): Json<TranscriptRequest>,
) -> Result<(StatusCode, Json<TranscriptResponse>), ApiError> {
    let text = validate_transcript(&req.text)?;

    let event = TranscriptEvent::Transcript {
        text: text.to_string(),
    };
    match state.pipeline.dispatch(event) {
        DispatchOutcome::Queued => Ok((StatusCode::ACCEPTED, Json(TranscriptResponse { queued: true }))),
        DispatchOutcome::QueueFull => Err(ApiError::QueueFull),
        DispatchOutcome::Closed => Err(ApiError::InternalError(
            "Pipeline worker has stopped".to_string(),
        )),
        // validation already rejected blank text
        DispatchOutcome::Ignored => Err(ApiError::InvalidInput("Text cannot be empty".to_string())),
    }
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.pipeline.metrics().snapshot())
}
