//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaConfig;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let state = api::create_default_state(SagaConfig::without_pauses());
    api::create_app(state, get_metrics_handle())
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["active_runs"], 0);
}

#[tokio::test]
async fn test_list_scenarios() {
    let app = setup();
    let (status, json) = send(&app, "GET", "/scenarios", None).await;

    assert_eq!(status, StatusCode::OK);
    let scenarios = json.as_array().unwrap();
    assert_eq!(scenarios.len(), 9);
    assert!(scenarios.iter().any(|s| s["scenario"] == "APIFailure"));
    assert!(
        scenarios
            .iter()
            .any(|s| s["run_type"] == "OrderWorkflowHumanInLoopUpdate")
    );
}

#[tokio::test]
async fn test_start_order_and_wait_for_result() {
    let app = setup();
    let (status, json) = send(
        &app,
        "POST",
        "/orders",
        Some(json!({ "order_id": "2001", "address": "12 Elm St" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["run_id"], "order-2001");
    assert_eq!(json["scenario"], "HappyPath");

    let (status, json) = send(&app, "GET", "/orders/2001/result", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["address"], "12 Elm St");
    assert!(!json["tracking_id"].as_str().unwrap().is_empty());

    let (status, json) = send(&app, "GET", "/orders/2001/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["progress"], 100);
    assert_eq!(json["state"], "Completed");
}

#[tokio::test]
async fn test_generated_order_id() {
    let app = setup();
    let (status, json) = send(&app, "POST", "/orders", Some(json!({}))).await;

    assert_eq!(status, StatusCode::CREATED);
    let order_id = json["order_id"].as_str().unwrap();
    assert_eq!(order_id.len(), 8);
    assert_eq!(json["run_id"], format!("order-{order_id}"));
}

#[tokio::test]
async fn test_unknown_scenario_is_rejected() {
    let app = setup();
    let (status, json) = send(
        &app,
        "POST",
        "/orders",
        Some(json!({ "order_id": "2002", "scenario": "Teleport" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Teleport"));
}

#[tokio::test]
async fn test_duplicate_start_while_running_conflicts() {
    let app = setup();
    let body = json!({ "order_id": "2003", "scenario": "HumanInLoopSignal" });

    let (status, _) = send(&app, "POST", "/orders", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, "POST", "/orders", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let app = setup();
    let (status, json) = send(&app, "GET", "/orders/9999/progress", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("order-9999"));
}

#[tokio::test]
async fn test_update_corrects_address() {
    let app = setup();
    send(
        &app,
        "POST",
        "/orders",
        Some(json!({ "order_id": "2004", "scenario": "HumanInLoopUpdate" })),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        "/orders/2004/update",
        Some(json!({ "address": "Oak Ave" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Oak Ave"));

    let (status, json) = send(
        &app,
        "POST",
        "/orders/2004/update",
        Some(json!({ "address": "456 Oak Ave" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], "Updated address: 456 Oak Ave");

    let (status, json) = send(&app, "GET", "/orders/2004/result", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["address"], "456 Oak Ave");
}

#[tokio::test]
async fn test_signal_corrects_address() {
    let app = setup();
    send(
        &app,
        "POST",
        "/orders",
        Some(json!({ "order_id": "2005", "scenario": "HumanInLoopSignal" })),
    )
    .await;

    let (status, _) = send(
        &app,
        "POST",
        "/orders/2005/signal",
        Some(json!({ "address": "789 Pine Rd" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, json) = send(&app, "GET", "/orders/2005/result", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["address"], "789 Pine Rd");
}

#[tokio::test]
async fn test_malformed_signal_payload_is_rejected() {
    let app = setup();
    send(
        &app,
        "POST",
        "/orders",
        Some(json!({ "order_id": "2006", "scenario": "HumanInLoopSignal" })),
    )
    .await;

    let (status, _) = send(
        &app,
        "POST",
        "/orders/2006/signal",
        Some(json!({ "street": "789 Pine Rd" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_run_reports_error() {
    let app = setup();
    send(
        &app,
        "POST",
        "/orders",
        Some(json!({ "order_id": "2007", "scenario": "RecoverableFailure" })),
    )
    .await;

    let (status, json) = send(&app, "GET", "/orders/2007/result", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Simulated bug - fix me!");

    let (status, json) = send(&app, "GET", "/orders/2007/progress", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Simulated bug - fix me!");
    assert_eq!(json["progress"], 75);
    assert_eq!(json["status"], Value::Null);

    let (status, _) = send(
        &app,
        "POST",
        "/orders/2007/signal",
        Some(json!({ "address": "1 Late St" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_finished_runs_are_pruned_at_capacity() {
    let app = api::create_app(
        api::create_state(SagaConfig::without_pauses(), 1),
        get_metrics_handle(),
    );
    send(&app, "POST", "/orders", Some(json!({ "order_id": "2009" }))).await;
    let (status, _) = send(&app, "GET", "/orders/2009/result", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "POST", "/orders", Some(json!({ "order_id": "2010" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, "GET", "/orders/2009/progress", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", "/orders/2010/result", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    send(&app, "POST", "/orders", Some(json!({ "order_id": "2008" }))).await;
    send(&app, "GET", "/orders/2008/result", None).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_executions_total"));
}
