//! HTTP handlers for the functions API
//!
//! Implements:
//! - ANY /enqueue - Enqueue one task for the processtask function
//! - POST /processtask - Receive a task dispatched by Cloud Tasks
//! - GET /health - Liveness
//! - GET /ready - Readiness (queue reachable)
//! - GET /metrics - Prometheus metrics

use crate::enqueuer::LazyEnqueuer;
use crate::processor::TaskProcessor;
use crate::types::{DispatchRequest, DispatchResponse, HealthResponse, TaskHeaders};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use backtask_gcp::metrics::DISPATCHED_TOTAL;
use std::sync::Arc;
use tracing::{error, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub enqueuer: Arc<LazyEnqueuer>,
    pub processor: Arc<dyn TaskProcessor>,
}

/// Enqueue one backup task
///
/// Accepts any method. Responds `200 Enqueued` once Cloud Tasks has
/// accepted the task. Credential or configuration failures surface here as
/// a 500 rather than at startup.
pub async fn enqueue_handler(State(state): State<AppState>) -> Result<&'static str, EnqueueError> {
    let enqueuer = state.enqueuer.get().await.map_err(|e| {
        error!(error = %e, "Enqueuer initialization failed");
        EnqueueError
    })?;

    enqueuer.enqueue().await.map_err(|e| {
        error!(error = %e, "Enqueue request failed");
        EnqueueError
    })?;

    Ok("Enqueued")
}

/// Receive a task dispatched by Cloud Tasks
///
/// The body must be a JSON object with a `data` field. The data is passed
/// to the configured [`TaskProcessor`] unchanged.
pub async fn processtask_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DispatchResponse>, DispatchError> {
    let request: DispatchRequest = serde_json::from_slice(&body).map_err(|e| {
        DISPATCHED_TOTAL.with_label_values(&["rejected"]).inc();
        DispatchError::InvalidRequest(e.to_string())
    })?;

    let task = TaskHeaders::from_headers(&headers);

    if let Err(e) = state.processor.process(&request.data, &task).await {
        DISPATCHED_TOTAL.with_label_values(&["failure"]).inc();
        error!(
            task_name = ?task.task_name,
            error = %e,
            "Task processing failed"
        );
        return Err(DispatchError::Processing);
    }

    DISPATCHED_TOTAL.with_label_values(&["success"]).inc();
    Ok(Json(DispatchResponse::empty()))
}

/// Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Readiness check: the enqueuer must initialize and the queue be reachable
pub async fn ready_handler(State(state): State<AppState>) -> Response {
    let enqueuer = match state.enqueuer.get().await {
        Ok(enqueuer) => enqueuer,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            return (StatusCode::SERVICE_UNAVAILABLE, "Enqueuer unavailable").into_response();
        }
    };

    match enqueuer.queue().health_check().await {
        Ok(()) => Json(HealthResponse::healthy()).into_response(),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "Queue unavailable").into_response()
        }
    }
}

/// Prometheus metrics in text exposition format
pub async fn metrics_handler() -> Response {
    let encoder = prometheus::TextEncoder::new();
    match encoder.encode_to_string(&prometheus::gather()) {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Enqueue failure; details are logged, never returned
#[derive(Debug)]
pub struct EnqueueError;

impl IntoResponse for EnqueueError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// Error types for the dispatch handler
#[derive(Debug)]
pub enum DispatchError {
    InvalidRequest(String),
    Processing,
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            DispatchError::InvalidRequest(ref msg) => {
                warn!(error = %msg, "Invalid task request received");
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT")
            }
            DispatchError::Processing => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };

        let body = serde_json::json!({
            "error": {
                "status": code,
                "message": status.canonical_reason().unwrap_or("Error"),
            }
        });
        (status, Json(body)).into_response()
    }
}
