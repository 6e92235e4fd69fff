//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A run for the order is still in flight.
    #[error("{0}")]
    Conflict(String),
    /// Saga error, mapped by kind.
    #[error(transparent)]
    Saga(#[from] SagaError),
    /// The run failed; the body keeps the last reported progress.
    #[error("{source}")]
    RunFailed {
        source: SagaError,
        progress: u8,
        status: Option<String>,
    },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Saga(err) | ApiError::RunFailed { source: err, .. } => saga_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::info!(error = %self, %status, "request rejected");
        }

        let body = match &self {
            ApiError::RunFailed {
                progress,
                status: label,
                ..
            } => serde_json::json!({
                "error": self.to_string(),
                "progress": progress,
                "status": label,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::RunNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::RunClosed(_) => StatusCode::CONFLICT,
        SagaError::UnknownMessage { .. } => StatusCode::BAD_REQUEST,
        err if err.is_validation_failure() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = SagaError::InvalidAddress {
            address: "Elm St".to_string(),
        };
        assert_eq!(ApiError::from(invalid).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(SagaError::RunNotFound("order-1".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(SagaError::RunClosed("order-1".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(SagaError::SimulatedFault).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_failed_run_body_keeps_progress() {
        let err = ApiError::RunFailed {
            source: SagaError::SimulatedFault,
            progress: 75,
            status: Some("Ship Order".to_string()),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Simulated bug - fix me!");
        assert_eq!(json["progress"], 75);
        assert_eq!(json["status"], "Ship Order");
    }
}
