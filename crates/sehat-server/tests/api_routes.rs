//! Router-level tests: requests go through the full axum stack with no
//! LLM provider configured, so every stage runs on local rules.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use sehat_core::{DataPaths, PipelineSettings, SehatConfig};
use sehat_reasoner::LLMConfig;
use sehat_server::{build_router, AppState};

fn test_app() -> (Router, Arc<AppState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = SehatConfig {
        port: 0,
        data_paths: DataPaths::new(dir.path()).unwrap(),
        pipeline: PipelineSettings::default(),
    };
    let state = Arc::new(AppState::new(config, LLMConfig::default()).unwrap());
    (build_router(state.clone()), state, dir)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_analyze_without_remote_is_degraded() {
    let (app, _state, _dir) = test_app();
    let (status, json) = send(
        &app,
        post("/api/analyze", serde_json::json!({ "query": "fever and headache for 3 days" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mode"], "degraded");
    assert_eq!(json["risk"]["risk_level"], "MEDIUM");
    assert_eq!(json["outcome"], "done");
    assert_eq!(json["trace"].as_array().unwrap().len(), 4);
    assert_eq!(json["symptoms"][0]["code"], "fever");
    assert_eq!(json["symptoms"][0]["source"], "rule");
    assert!(json["disclaimer"].as_str().is_some_and(|d| !d.is_empty()));
    assert!(json["explanation"]["summary"].as_str().unwrap().contains("fever"));
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let (app, _state, _dir) = test_app();
    let (status, json) = send(&app, post("/api/analyze", serde_json::json!({ "query": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, _) = send(&app, post("/api/quick-check", serde_json::json!({ "symptoms": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_offline_emergency_escalates() {
    let (app, _state, _dir) = test_app();
    let (status, json) = send(
        &app,
        post(
            "/api/offline/analyze",
            serde_json::json!({ "text": "severe chest pain", "sessionId": "abc" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["session_id"], "abc");
    assert_eq!(json["outcome"], "escalated");
    assert_eq!(json["risk"]["risk_level"], "EMERGENCY");
    assert_eq!(json["safety_verdict"]["escalation"], true);
    assert_eq!(json["answer"], serde_json::json!(["seek immediate care"]));
    assert_eq!(json["trace"].as_array().unwrap().len(), 3);
    let contacts = json["emergency_contacts"].as_array().unwrap();
    assert!(contacts.iter().any(|c| c["number"] == "1122"));
}

#[tokio::test]
async fn test_quick_check() {
    let (app, _state, _dir) = test_app();
    let (status, json) = send(
        &app,
        post(
            "/api/quick-check",
            serde_json::json!({ "symptoms": ["cough", "fever", "fatigue"], "language": "en" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["risk"]["risk_level"], "HIGH");
    assert_eq!(json["mode"], "degraded");
}

#[tokio::test]
async fn test_symptom_lookup() {
    let (app, _state, _dir) = test_app();
    let (status, json) = send(&app, get("/api/offline/symptom/bukhar")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "symptom");
    assert_eq!(json["code"], "fever");

    let (status, json) = send(&app, get("/api/offline/symptom/xyzzy")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_emergency_check() {
    let (app, _state, _dir) = test_app();
    let (status, json) = send(&app, get("/api/offline/emergency-check?query=seene%20mein%20dard")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["emergency"], true);
    assert_eq!(json["symptoms"], serde_json::json!(["chest_pain"]));
    assert_eq!(json["message"], "seek immediate care");

    let (_, json) = send(&app, get("/api/offline/emergency-check?query=mild%20cough")).await;
    assert_eq!(json["emergency"], false);
    assert!(json["emergencyContacts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_first_aid() {
    let (app, _state, _dir) = test_app();
    let (status, json) = send(&app, get("/api/offline/first-aid/Burns?language=ur")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["condition"], "burns");
    assert!(json["steps"][0].as_str().unwrap().contains("ٹھنڈے پانی"));
    assert_eq!(json["emergencyNumber"], "1122");
    assert!(json["note"].as_str().is_some_and(|n| !n.is_empty()));

    let (status, json) = send(&app, get("/api/offline/first-aid/heat%20stroke")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["condition"], "heat_stroke");

    let (status, json) = send(&app, get("/api/offline/first-aid/frostbite")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let available = json["availableConditions"].as_array().unwrap();
    assert!(available.iter().any(|c| c == "choking"));
}

#[tokio::test]
async fn test_all_symptoms() {
    let (app, state, _dir) = test_app();
    let (status, json) = send(&app, get("/api/offline/all-symptoms?language=ur")).await;
    assert_eq!(status, StatusCode::OK);
    let expected = state.orchestrator.knowledge().symptoms().len();
    assert_eq!(json["count"], expected);
    let symptoms = json["symptoms"].as_array().unwrap();
    assert_eq!(symptoms.len(), expected);
    let chest = symptoms.iter().find(|s| s["code"] == "chest_pain").unwrap();
    assert_eq!(chest["emergency"], true);
    let fever = symptoms.iter().find(|s| s["code"] == "fever").unwrap();
    assert_eq!(fever["emergency"], false);
}

#[tokio::test]
async fn test_emergency_contacts_directory() {
    let (app, _state, _dir) = test_app();
    let (status, json) = send(&app, get("/api/emergency-contacts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["country"], "Pakistan");
    let contacts = json["contacts"].as_array().unwrap();
    assert!(contacts.iter().any(|c| c["number"] == "1122"));
    assert!(contacts.iter().any(|c| c["number"] == "15"));
    assert!(json["advice"].as_str().unwrap().starts_with("In case of emergency"));

    let (_, json) = send(&app, get("/api/emergency-contacts?language=ur")).await;
    assert!(json["advice"].as_str().unwrap().starts_with("ایمرجنسی"));
}

#[tokio::test]
async fn test_analyze_summary_in_query_language() {
    let (app, _state, _dir) = test_app();
    let (status, json) = send(
        &app,
        post(
            "/api/analyze",
            serde_json::json!({ "query": "bukhar aur sir dard", "language": "roman_urdu" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["explanation"]["summary"]
        .as_str()
        .unwrap()
        .starts_with("Khatre ki bunyadi wajah"));
}

#[tokio::test]
async fn test_status_reports_breakers() {
    let (app, _state, _dir) = test_app();
    let (status, json) = send(&app, get("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["remoteConfigured"], false);
    assert_eq!(json["auditStore"], true);
    let breakers = json["breakers"].as_array().unwrap();
    assert_eq!(breakers.len(), 4);
    assert_eq!(breakers[0]["stage"], "symptom");
    assert!(breakers.iter().all(|b| b["status"] == "closed"));

    let (status, json) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_dashboard_counts_audited_runs() {
    let (app, state, _dir) = test_app();
    send(&app, post("/api/analyze", serde_json::json!({ "query": "fever" }))).await;
    send(&app, post("/api/offline/analyze", serde_json::json!({ "query": "chest pain" }))).await;

    // Audit writes are fire-and-forget; wait for both to land.
    let store = state.store.clone().unwrap();
    for _ in 0..50 {
        if store.count().unwrap() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let (status, json) = send(&app, get("/api/dashboard/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_records"], 2);
    assert_eq!(json["by_outcome"]["escalated"], 1);
    assert_eq!(json["by_mode"]["degraded"], 2);
    let codes: Vec<&str> = json["top_symptoms"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["code"].as_str())
        .collect();
    assert!(codes.contains(&"fever"));
    assert!(codes.contains(&"chest_pain"));
}
