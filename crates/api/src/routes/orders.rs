//! Order run endpoints: start, progress, address corrections and result.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderInput;
use saga::order_fulfillment::MESSAGE_UPDATE_ORDER;
use saga::{
    OrderHandle, OrderSaga, SagaError, SagaRunVariant, SagaState, SimulatedOrderActivities,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ApiError;

/// Address used when a start request does not carry one.
pub const DEFAULT_ADDRESS: &str = "123 Main St";

/// Number of runs kept before terminal runs are pruned.
pub const DEFAULT_RETAINED_RUNS: usize = 1000;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub saga: OrderSaga<SimulatedOrderActivities>,
    /// Latest run per order id.
    pub runs: RwLock<HashMap<String, OrderHandle>>,
    retained_runs: usize,
}

impl AppState {
    pub fn new(saga: OrderSaga<SimulatedOrderActivities>) -> Self {
        Self::with_retention(saga, DEFAULT_RETAINED_RUNS)
    }

    /// Once `retained_runs` runs are registered, starting another one drops
    /// every finished run first.
    pub fn with_retention(
        saga: OrderSaga<SimulatedOrderActivities>,
        retained_runs: usize,
    ) -> Self {
        Self {
            saga,
            runs: RwLock::new(HashMap::new()),
            retained_runs,
        }
    }

    /// Number of runs that have not reached a terminal state.
    pub async fn active_runs(&self) -> usize {
        self.runs
            .read()
            .await
            .values()
            .filter(|handle| !handle.state().is_terminal())
            .count()
    }

    async fn lookup(&self, order_id: &str) -> Result<OrderHandle, ApiError> {
        self.runs
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| SagaError::RunNotFound(format!("order-{order_id}")).into())
    }
}

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct StartOrderRequest {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub scenario: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderStartedResponse {
    pub order_id: String,
    pub run_id: String,
    pub scenario: &'static str,
    pub started_at: String,
}

#[derive(Serialize)]
pub struct ProgressResponse {
    pub progress: u8,
    pub status: Option<String>,
    pub state: SagaState,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    pub result: String,
}

#[derive(Serialize)]
pub struct ResultResponse {
    pub tracking_id: String,
    pub address: String,
}

// -- Handlers --

/// POST /orders — start a run for an order.
#[tracing::instrument(skip(state, req))]
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartOrderRequest>,
) -> Result<(StatusCode, Json<OrderStartedResponse>), ApiError> {
    let variant = match req.scenario.as_deref() {
        Some(scenario) => scenario.parse::<SagaRunVariant>()?,
        None => SagaRunVariant::default(),
    };
    let order_id = req.order_id.unwrap_or_else(generate_order_id);
    let address = req.address.unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let input = OrderInput::new(order_id, address).map_err(SagaError::from)?;

    let mut runs = state.runs.write().await;
    if let Some(existing) = runs.get(&input.order_id) {
        if !existing.state().is_terminal() {
            return Err(ApiError::Conflict(format!(
                "run '{}' is already in progress",
                existing.run_id()
            )));
        }
    }

    if runs.len() >= state.retained_runs {
        let before = runs.len();
        runs.retain(|_, handle| !handle.state().is_terminal());
        tracing::debug!(pruned = before - runs.len(), "pruned finished runs");
    }

    let handle = state.saga.start(input, variant);
    let order_id = handle.order_id().to_string();
    tracing::info!(%order_id, run_id = handle.run_id(), %variant, "order run started");

    let response = OrderStartedResponse {
        order_id: order_id.clone(),
        run_id: handle.run_id().to_string(),
        scenario: variant.scenario_name(),
        started_at: chrono::Utc::now().to_rfc3339(),
    };
    runs.insert(order_id, handle);

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/{id}/progress — current progress; a failed run answers with
/// its error next to the last reported progress.
#[tracing::instrument(skip(state))]
pub async fn progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let handle = state.lookup(&id).await?;
    let snapshot = handle.snapshot();
    if let Some(Err(source)) = handle.outcome() {
        return Err(ApiError::RunFailed {
            source,
            progress: snapshot.progress,
            status: snapshot.status,
        });
    }

    Ok(Json(ProgressResponse {
        progress: snapshot.progress,
        status: snapshot.status,
        state: handle.state(),
    }))
}

/// POST /orders/{id}/signal — fire-and-forget address correction.
#[tracing::instrument(skip(state, payload))]
pub async fn signal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let handle = state.lookup(&id).await?;
    handle.signal(MESSAGE_UPDATE_ORDER, payload)?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /orders/{id}/update — validated address correction.
#[tracing::instrument(skip(state, payload))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let handle = state.lookup(&id).await?;
    let result = handle.update(MESSAGE_UPDATE_ORDER, payload)?;
    Ok(Json(UpdateResponse { result }))
}

/// GET /orders/{id}/result — waits for the run to finish.
#[tracing::instrument(skip(state))]
pub async fn result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let handle = state.lookup(&id).await?;
    let output = handle.result().await?;
    Ok(Json(ResultResponse {
        tracking_id: output.tracking_id,
        address: output.address,
    }))
}

fn generate_order_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id.chars().take(8).collect()
}
