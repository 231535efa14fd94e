//! Status, health and dashboard routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

const TOP_SYMPTOMS: usize = 10;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/dashboard/stats", get(dashboard_stats))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/status: remote provider and per-stage breaker state.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let pipeline = &state.config.pipeline;
    Json(serde_json::json!({
        "remoteConfigured": state.orchestrator.has_remote(),
        "remote": state.orchestrator.remote_name(),
        "provider": state.provider_status,
        "breakers": state.orchestrator.breakers().snapshot(),
        "auditStore": state.store.is_some(),
        "remoteTimeoutMs": pipeline.remote_timeout.as_millis() as u64,
        "pipelineTimeoutMs": pipeline.pipeline_timeout.as_millis() as u64,
        "breakerThreshold": pipeline.breaker_threshold,
        "breakerCooldownSecs": pipeline.breaker_cooldown.as_secs(),
    }))
}

/// GET /api/dashboard/stats: aggregates over persisted audit records.
async fn dashboard_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(store) = state.store.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "Audit store unavailable" })),
        );
    };
    match store.stats(TOP_SYMPTOMS) {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::to_value(stats).unwrap_or_default()),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}
