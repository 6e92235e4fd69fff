//! HTTP API for the order saga.
//!
//! Starts runs per scenario, exposes progress queries and address
//! corrections, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{OrderSaga, SagaConfig, SimulatedOrderActivities};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::{AppState, DEFAULT_RETAINED_RUNS};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/scenarios", get(routes::system::scenarios))
        .route("/orders", post(routes::orders::start))
        .route("/orders/{id}/progress", get(routes::orders::progress))
        .route("/orders/{id}/signal", post(routes::orders::signal))
        .route("/orders/{id}/update", post(routes::orders::update))
        .route("/orders/{id}/result", get(routes::orders::result))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state backed by simulated order tasks.
pub fn create_default_state(config: SagaConfig) -> Arc<AppState> {
    create_state(config, DEFAULT_RETAINED_RUNS)
}

/// Creates application state that keeps up to `retained_runs` runs.
pub fn create_state(config: SagaConfig, retained_runs: usize) -> Arc<AppState> {
    let activities = Arc::new(SimulatedOrderActivities::new(config.task_latency));
    Arc::new(AppState::with_retention(
        OrderSaga::new(activities, config),
        retained_runs,
    ))
}
