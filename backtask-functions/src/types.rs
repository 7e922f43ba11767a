//! Type definitions for the functions HTTP API
//!
//! This module defines the data contracts between Cloud Tasks and the
//! dispatched handler.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Body Cloud Tasks delivers to the dispatched handler
///
/// Task functions wrap their payload in a `data` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub data: serde_json::Value,
}

/// Body returned to Cloud Tasks after processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub result: serde_json::Value,
}

impl DispatchResponse {
    pub fn empty() -> Self {
        Self {
            result: serde_json::Value::Null,
        }
    }
}

/// Delivery metadata Cloud Tasks attaches as `X-CloudTasks-*` headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskHeaders {
    pub queue_name: Option<String>,
    pub task_name: Option<String>,
    pub retry_count: Option<u32>,
    pub execution_count: Option<u32>,
    pub eta: Option<String>,
}

impl TaskHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let number = |name: &str| text(name).and_then(|v| v.parse::<u32>().ok());

        Self {
            queue_name: text("x-cloudtasks-queuename"),
            task_name: text("x-cloudtasks-taskname"),
            retry_count: number("x-cloudtasks-taskretrycount"),
            execution_count: number("x-cloudtasks-taskexecutioncount"),
            eta: text("x-cloudtasks-tasketa"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Optional version information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl HealthResponse {
    /// Create a healthy response
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}
