//! HTTP-surface integration tests over the in-memory backends.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use loanflow::api;
use loanflow_core::{
    Catalog, EvaluatorConfig, FieldValue, MemoryRecordStore, MemoryStateStore,
    MemoryWritebackQueue, QuestionService, RulesEngine, StateCache, StateLoader, SystemOfRecord,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

async fn test_app() -> (axum::Router, TempDir) {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "sections/identity.yaml",
        "id: identity\nname: Identity\nsequence: 10\n",
    );
    write(
        dir.path(),
        "questions/citizenship.yaml",
        concat!(
            "id: Q100\n",
            "name: Citizenship\n",
            "section: identity\n",
            "ordinal: 1\n",
            "level: borrower\n",
            "instructions: What is your citizenship status?\n",
            "type: choice\n",
            "options: [US Citizen, Permanent Resident]\n",
            "form_fields:\n",
            "  - order: 1\n",
            "    label: Citizenship\n",
            "    access_field: citizenship_type\n",
        ),
    );

    let engine = Arc::new(RulesEngine::new());
    let catalog = Arc::new(Catalog::load(dir.path(), &engine).unwrap());

    let record = Arc::new(MemoryRecordStore::new());
    let mut proposal = HashMap::new();
    proposal.insert("pid".to_string(), FieldValue::Text("P-1".into()));
    proposal.insert("deal_pid".to_string(), FieldValue::Text("D-1".into()));
    record.put_proposal("P-1", proposal).await;
    let mut borrower = HashMap::new();
    borrower.insert("pid".to_string(), FieldValue::Text("B-1".into()));
    borrower.insert("first_name".to_string(), FieldValue::Text("Ada".into()));
    borrower.insert("last_name".to_string(), FieldValue::Text("Lovelace".into()));
    record.put_borrower("D-1", borrower).await;

    let loader = StateLoader::new(record as Arc<dyn SystemOfRecord>);
    let cache = Arc::new(StateCache::new(Arc::new(MemoryStateStore::new()), loader));
    let queue = Arc::new(MemoryWritebackQueue::new());

    let service = Arc::new(QuestionService::new(
        catalog,
        engine,
        cache,
        queue,
        EvaluatorConfig::default(),
    ));
    (api::routes(service), dir)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_and_ready() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ready"], true);
    assert_eq!(json["rules"], 1);
}

#[tokio::test]
async fn test_get_questions_roundtrip() {
    let (app, _dir) = test_app().await;

    let response = app
        .oneshot(
            Request::get("/api/v1/proposals/P-1/questions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["queue"][0]["questionId"], "Q100");
    assert_eq!(json["queue"][0]["entityPid"], "B-1");
    assert_eq!(json["nextRecommended"], "Q100");
    assert!(json["stateVersion"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_submit_answer_roundtrip() {
    let (app, _dir) = test_app().await;

    let body = serde_json::json!({
        "questionId": "Q100",
        "entityPid": "B-1",
        "answer": "US Citizen",
        "confidence": 0.95,
    });
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/v1/proposals/P-1/answers")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["queue"].as_array().unwrap().is_empty());

    let response = app
        .oneshot(
            Request::get("/api/v1/proposals/P-1/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["fields"]["citizenship_type"], "US Citizen");
    assert_eq!(json["answered"][0], "Q100");
}

#[tokio::test]
async fn test_error_statuses() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/v1/proposals/P-unknown/questions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = serde_json::json!({
        "questionId": "Q-unknown",
        "answer": "x",
    });
    let response = app
        .oneshot(
            Request::post("/api/v1/proposals/P-1/answers")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
