//! Cloud Tasks HTTP task descriptors and queue dispatch policy

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Payload carried by every backup task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupPayload {
    pub data: String,
}

impl Default for BackupPayload {
    fn default() -> Self {
        Self {
            data: "test_data".to_string(),
        }
    }
}

/// HTTP method of a task's request; backup tasks are always POSTed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
}

impl HttpMethod {
    /// Name used by the Cloud Tasks API
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
        }
    }
}

/// One HTTP task to hand to Cloud Tasks
///
/// Cloud Tasks performs the request itself and attaches an OIDC identity
/// token minted for `oidc_service_account_email`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTask {
    pub http_method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub oidc_service_account_email: String,
}

impl HttpTask {
    /// Build the backup task targeting `url`
    ///
    /// POST with a JSON body of `{"data": "test_data"}` and a single
    /// `Content-type: application/json` header.
    pub fn backup(url: impl Into<String>, service_account_email: impl Into<String>) -> Result<Self> {
        let body = serde_json::to_vec(&BackupPayload::default())
            .map_err(|e| Error::Internal(format!("Failed to serialize payload: {}", e)))?;

        let mut headers = BTreeMap::new();
        headers.insert("Content-type".to_string(), "application/json".to_string());

        Ok(Self {
            http_method: HttpMethod::Post,
            url: url.into(),
            headers,
            body,
            oidc_service_account_email: service_account_email.into(),
        })
    }

    /// Render the `tasks.create` request body
    pub fn to_create_request(&self) -> serde_json::Value {
        serde_json::json!({
            "task": {
                "httpRequest": {
                    "url": self.url,
                    "httpMethod": self.http_method.as_str(),
                    "headers": self.headers,
                    "body": STANDARD.encode(&self.body),
                    "oidcToken": {
                        "serviceAccountEmail": self.oidc_service_account_email,
                    }
                }
            }
        })
    }
}

/// Retry and rate limits a task queue applies to dispatched tasks
///
/// Cloud Tasks enforces these; nothing here retries or throttles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_concurrent_dispatches: u32,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_backoff: Duration::from_secs(60),
            max_concurrent_dispatches: 10,
        }
    }
}

impl DispatchPolicy {
    /// Field mask naming the queue fields this policy sets
    pub const UPDATE_MASK: &'static str =
        "retryConfig.maxAttempts,retryConfig.minBackoff,rateLimits.maxConcurrentDispatches";

    /// Render the queue fields for a `queues.patch` request
    pub fn to_queue_patch(&self) -> serde_json::Value {
        serde_json::json!({
            "retryConfig": {
                "maxAttempts": self.max_attempts,
                "minBackoff": format_duration(self.min_backoff),
            },
            "rateLimits": {
                "maxConcurrentDispatches": self.max_concurrent_dispatches,
            }
        })
    }
}

/// Protobuf JSON duration, e.g. "60s" or "0.500s"
fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_task_shape() {
        let task = HttpTask::backup("https://example.com/fn", "sa@proj-1.iam.gserviceaccount.com")
            .unwrap();

        assert_eq!(task.http_method, HttpMethod::Post);
        assert_eq!(task.url, "https://example.com/fn");
        assert_eq!(task.headers.len(), 1);
        assert_eq!(task.headers["Content-type"], "application/json");
        assert_eq!(task.oidc_service_account_email, "sa@proj-1.iam.gserviceaccount.com");

        let body: serde_json::Value = serde_json::from_slice(&task.body).unwrap();
        assert_eq!(body, serde_json::json!({"data": "test_data"}));
    }

    #[test]
    fn test_create_request_encodes_body_as_base64() {
        let task = HttpTask::backup("https://example.com/fn", "sa@example.com").unwrap();
        let request = task.to_create_request();
        let http = &request["task"]["httpRequest"];

        assert_eq!(http["httpMethod"], "POST");
        assert_eq!(http["url"], "https://example.com/fn");
        assert_eq!(http["headers"], serde_json::json!({"Content-type": "application/json"}));
        assert_eq!(http["oidcToken"]["serviceAccountEmail"], "sa@example.com");

        let decoded = STANDARD.decode(http["body"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, task.body);
    }

    #[test]
    fn test_create_request_sets_no_task_name() {
        let request = HttpTask::backup("https://example.com/fn", "sa@example.com")
            .unwrap()
            .to_create_request();
        assert!(request["task"].get("name").is_none());
    }

    #[test]
    fn test_default_dispatch_policy_patch() {
        let patch = DispatchPolicy::default().to_queue_patch();
        assert_eq!(
            patch,
            serde_json::json!({
                "retryConfig": {"maxAttempts": 5, "minBackoff": "60s"},
                "rateLimits": {"maxConcurrentDispatches": 10},
            })
        );
    }

    #[test]
    fn test_format_fractional_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.500s");
    }
}
