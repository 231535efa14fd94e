//! Offline lookups served straight from the knowledge tables.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use sehat_core::ESCALATION_MESSAGE;
use sehat_knowledge::DEFAULT_LANGUAGE;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/offline/symptom/{name}", get(lookup_symptom))
        .route("/offline/emergency-check", get(emergency_check))
        .route("/offline/first-aid/{condition}", get(first_aid))
        .route("/offline/all-symptoms", get(all_symptoms))
        .route("/emergency-contacts", get(emergency_contacts))
}

#[derive(Debug, Deserialize)]
pub struct EmergencyCheckParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct LanguageParams {
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// GET /api/offline/symptom/{name}: any script or alias.
async fn lookup_symptom(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.knowledge().lookup(&name) {
        Some(fact) => (
            StatusCode::OK,
            Json(serde_json::to_value(fact).unwrap_or_default()),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("No entry for {:?}", name) })),
        ),
    }
}

/// GET /api/offline/emergency-check?query=
async fn emergency_check(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EmergencyCheckParams>,
) -> Json<serde_json::Value> {
    let found = state.orchestrator.rules().emergency_check(&params.query);
    let emergency = !found.is_empty();
    let contacts = if emergency {
        state.orchestrator.knowledge().emergency_contacts().to_vec()
    } else {
        Vec::new()
    };

    Json(serde_json::json!({
        "emergency": emergency,
        "symptoms": found,
        "message": emergency.then_some(ESCALATION_MESSAGE),
        "emergencyContacts": contacts,
    }))
}

/// GET /api/offline/first-aid/{condition}?language=
async fn first_aid(
    State(state): State<Arc<AppState>>,
    Path(condition): Path<String>,
    Query(params): Query<LanguageParams>,
) -> impl IntoResponse {
    let knowledge = state.orchestrator.knowledge();
    match knowledge.first_aid(&condition) {
        Some(fact) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "condition": fact.code,
                "steps": fact.steps_for(&params.language),
                "note": knowledge.first_aid_note(&params.language),
                "emergencyNumber": knowledge.emergency_contacts().first().map(|c| c.number.as_str()),
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("No first-aid entry for {:?}", condition),
                "availableConditions": knowledge.first_aid_topics(),
            })),
        ),
    }
}

/// GET /api/offline/all-symptoms?language=
async fn all_symptoms(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LanguageParams>,
) -> Json<serde_json::Value> {
    let symptoms: Vec<serde_json::Value> = state
        .orchestrator
        .knowledge()
        .symptoms()
        .iter()
        .map(|s| {
            serde_json::json!({
                "code": s.code,
                "emergency": s.emergency,
                "relatedConditions": s.related_conditions.len(),
                "hasAdvice": s.advice.contains_key(&params.language),
            })
        })
        .collect();
    Json(serde_json::json!({
        "count": symptoms.len(),
        "symptoms": symptoms,
    }))
}

/// GET /api/emergency-contacts?language=
async fn emergency_contacts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LanguageParams>,
) -> Json<serde_json::Value> {
    let knowledge = state.orchestrator.knowledge();
    Json(serde_json::json!({
        "country": "Pakistan",
        "contacts": knowledge.contact_directory(),
        "advice": knowledge.emergency_advice(&params.language),
    }))
}
