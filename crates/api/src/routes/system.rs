//! Health, metrics and scenario listing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaRunVariant;
use serde::Serialize;

use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_runs: usize,
}

#[derive(Serialize)]
pub struct ScenarioResponse {
    pub scenario: &'static str,
    pub run_type: String,
}

/// GET /health — returns system health and the number of unfinished runs.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_runs: state.active_runs().await,
    })
}

/// GET /metrics — returns Prometheus-formatted metrics.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}

/// GET /scenarios — lists the run variants that can be started.
pub async fn scenarios() -> Json<Vec<ScenarioResponse>> {
    Json(
        SagaRunVariant::ALL
            .iter()
            .map(|variant| ScenarioResponse {
                scenario: variant.scenario_name(),
                run_type: variant.run_type(),
            })
            .collect(),
    )
}
