//! Analysis routes. Each maps to one orchestrator run with a fixed mode hint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use sehat_core::{ModeHint, PipelineResult};

use super::error_response;
use crate::state::AppState;

type ApiResult = Result<Json<PipelineResult>, (StatusCode, Json<serde_json::Value>)>;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/quick-check", post(quick_check))
        .route("/offline/analyze", post(offline_analyze))
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(alias = "text")]
    pub query: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuickCheckRequest {
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

/// POST /api/analyze
async fn analyze(State(state): State<Arc<AppState>>, Json(req): Json<AnalyzeRequest>) -> ApiResult {
    run(&state, req, ModeHint::Full).await
}

/// POST /api/offline/analyze: local rules for every stage.
async fn offline_analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> ApiResult {
    run(&state, req, ModeHint::Offline).await
}

/// POST /api/quick-check: symptoms already identified by the caller.
async fn quick_check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuickCheckRequest>,
) -> ApiResult {
    let text = req
        .symptoms
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    let req = AnalyzeRequest {
        query: text,
        language: req.language,
        session_id: req.session_id,
    };
    run(&state, req, ModeHint::Quick).await
}

async fn run(state: &AppState, req: AnalyzeRequest, hint: ModeHint) -> ApiResult {
    state
        .orchestrator
        .analyze_with(&req.query, req.language.as_deref(), req.session_id, hint)
        .await
        .map(Json)
        .map_err(error_response)
}
