//! HTTP control surface tests
//!
//! Exercise the router in-process with `oneshot` requests.

mod helpers;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use helpers::*;
use serde_json::Value;
use signglove_common::events::WindowMode;
use signglove_engine::api::{create_router, AppState};
use signglove_engine::models::LabelSet;
use tower::ServiceExt;

const TEST_PORT: u16 = 5780;

fn setup_test_server() -> (axum::Router, TestSession) {
    let mut output = vec![0.025; 5];
    output[1] = 0.9;
    let t = scripted_session(
        ScriptedRuntime::new(TEST_WINDOW, output),
        LabelSet::default_for(5, "neutral", "backspace"),
        WindowMode::Batch,
        1,
    );
    let router = create_router(AppState {
        session: t.session.clone(),
        port: TEST_PORT,
    });
    (router, t)
}

async fn make_request(app: &axum::Router, method: Method, path: &str, body: Body) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(path).body(body).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _t) = setup_test_server();

    let (status, body) = make_request(&app, Method::GET, "/health", Body::empty()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "signglove-engine");
    assert_eq!(body["port"], TEST_PORT);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_status_before_start() {
    let (app, _t) = setup_test_server();

    let (status, body) = make_request(&app, Method::GET, "/status", Body::empty()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["active"], false);
    assert_eq!(body["mode"], "batch");
    assert_eq!(body["window_length"], TEST_WINDOW);
    assert_eq!(body["num_classes"], 5);
    assert_eq!(body["labels"][0], "A");
    assert_eq!(body["sequence_degraded"], false);
    assert_eq!(body["tree_degraded"], true);
    assert_eq!(body["gate"]["phase"], "idle");
    assert_eq!(body["transcript"], "");
}

#[tokio::test]
async fn test_start_ingest_stop_roundtrip() {
    let (app, t) = setup_test_server();

    let (status, body) = make_request(&app, Method::POST, "/session/start", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let batch = telemetry_batch(0, 15);
    let (status, body) = make_request(&app, Method::POST, "/ingest", Body::from(batch.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bytes"], batch.len());
    assert_eq!(body["records_enqueued"], 15);

    wait_for_windows(&t.state, 3).await;

    let (status, body) = make_request(&app, Method::POST, "/session/stop", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], session_id.as_str());
    assert_eq!(body["windows_inferred"], 3);
    assert_eq!(body["symbols_emitted"], 1);

    let (_, body) = make_request(&app, Method::GET, "/status", Body::empty()).await;
    assert_eq!(body["transcript"], "B");
    assert_eq!(body["counters"]["windows_inferred"], 3);
    assert_eq!(body["session"]["active"], false);
}

#[tokio::test]
async fn test_double_start_conflicts() {
    let (app, _t) = setup_test_server();

    let (status, _) = make_request(&app, Method::POST, "/session/start", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = make_request(&app, Method::POST, "/session/start", Body::empty()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["status"].as_str().unwrap().contains("already running"));

    let (status, _) = make_request(&app, Method::POST, "/session/stop", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_stop_without_session_conflicts() {
    let (app, _t) = setup_test_server();

    let (status, _) = make_request(&app, Method::POST, "/session/stop", Body::empty()).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_ingest_while_idle_enqueues_nothing() {
    let (app, _t) = setup_test_server();

    let (status, body) = make_request(&app, Method::POST, "/ingest", Body::from(telemetry_batch(0, 5))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records_enqueued"], 0);
    assert_eq!(body["queue_size"], 0);
}
