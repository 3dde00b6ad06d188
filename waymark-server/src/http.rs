//! Waymark HTTP REST API
//!
//! Axum-based HTTP server that exposes the tracking queries and event ingest
//! over HTTP. Runs alongside the Unix socket IPC server on port 8767
//! (configurable).
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! pure inner function. The inner functions are directly testable without
//! axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /health                              — health check with store status
//! - GET  /version                             — server version info
//! - GET  /timelines/active                    — currently open timelines
//! - GET  /timelines/:id/observations          — one page of a timeline's ledger
//! - POST /events                              — ingest a location event

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;
use waymark_core::TrackError;

use crate::context::AppContext;
use crate::router;
use crate::subsystems::query;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub ctx: AppContext,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/timelines/active", get(active_handler))
        .route("/timelines/:timeline_id/observations", get(detail_handler))
        .route("/events", post(ingest_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    ctx: AppContext,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.http.host, ctx.config.http.port);
    let state = Arc::new(HttpState { ctx });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Waymark HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct DetailParams {
    pub after: Option<i64>,
    pub limit: Option<u32>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — queries the store and returns (status_code, json_body).
pub async fn health_inner(ctx: &AppContext) -> (StatusCode, serde_json::Value) {
    match ctx.store.health().await {
        Ok(store) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store,
                "socket": ctx.config.service.socket_path,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "waymark/1",
    })
}

/// Inner active-timelines query. Empty is a normal 200.
pub async fn active_inner(ctx: &AppContext) -> (StatusCode, serde_json::Value) {
    match query::list_active_timelines(&ctx.store).await {
        Ok(data) => match serde_json::to_value(&data) {
            Ok(v) => (StatusCode::OK, v),
            Err(e) => internal_error(e.to_string()),
        },
        Err(e) => internal_error(e.to_string()),
    }
}

/// Inner timeline-detail query. Unknown ids yield an empty page, not a 404.
pub async fn detail_inner(
    ctx: &AppContext,
    timeline_id: Uuid,
    params: DetailParams,
) -> (StatusCode, serde_json::Value) {
    match query::timeline_detail(&ctx.ledger, timeline_id, params.after, params.limit).await {
        Ok(data) => match serde_json::to_value(&data) {
            Ok(v) => (StatusCode::OK, v),
            Err(e) => internal_error(e.to_string()),
        },
        Err(e) => internal_error(e.to_string()),
    }
}

/// Inner ingest — runs the shared write path. Validation failures are the
/// caller's fault (400); store failures are ours (500).
pub async fn ingest_inner(
    ctx: &AppContext,
    payload: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    match router::ingest_location(payload, ctx).await {
        Ok(receipt) => match serde_json::to_value(&receipt) {
            Ok(v) => (StatusCode::OK, v),
            Err(e) => internal_error(e.to_string()),
        },
        Err(TrackError::Validation(e)) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "error": e.to_string(),
                "status": "error",
            }),
        ),
        Err(e) => internal_error(e.to_string()),
    }
}

fn internal_error(msg: String) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        serde_json::json!({
            "error": msg,
            "status": "error",
        }),
    )
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.ctx).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn active_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = active_inner(&state.ctx).await;
    (status, Json(body))
}

pub async fn detail_handler(
    State(state): State<Arc<HttpState>>,
    Path(timeline_id): Path<Uuid>,
    Query(params): Query<DetailParams>,
) -> impl IntoResponse {
    let (status, body) = detail_inner(&state.ctx, timeline_id, params).await;
    (status, Json(body))
}

pub async fn ingest_handler(
    State(state): State<Arc<HttpState>>,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    let (status, body) = ingest_inner(&state.ctx, payload).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — inner functions against the in-memory backend
// ============================================================================
