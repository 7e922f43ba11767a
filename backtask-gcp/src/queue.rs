//! Cloud Tasks queue client

use crate::auth::TokenSource;
use crate::metrics::ENQUEUE_DURATION;
use crate::task::{DispatchPolicy, HttpTask};
use crate::{Error, Result, CLOUD_PLATFORM_SCOPE};
use std::sync::Arc;
use std::time::Duration;

/// Production Cloud Tasks API endpoint
pub const DEFAULT_TASKS_ENDPOINT: &str = "https://cloudtasks.googleapis.com";

/// A single Cloud Tasks queue
#[derive(Clone)]
pub struct CloudTasksQueue {
    project_id: String,
    location: String,
    queue_name: String,
    endpoint: String,
    auth: Arc<dyn TokenSource>,
    http_client: reqwest::Client,
}

impl CloudTasksQueue {
    /// Create a queue client against the production endpoint
    ///
    /// # Arguments
    ///
    /// * `project_id` - GCP project ID
    /// * `location` - GCP location/region (e.g., "us-central1")
    /// * `queue_name` - Cloud Tasks queue name
    /// * `auth` - Source of OAuth2 access tokens
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        queue_name: impl Into<String>,
        auth: Arc<dyn TokenSource>,
    ) -> Result<Self> {
        Self::with_endpoint(project_id, location, queue_name, auth, DEFAULT_TASKS_ENDPOINT)
    }

    /// Create a queue client against a custom endpoint (emulators, tests)
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any queue path segment is empty or
    /// contains a `/`.
    pub fn with_endpoint(
        project_id: impl Into<String>,
        location: impl Into<String>,
        queue_name: impl Into<String>,
        auth: Arc<dyn TokenSource>,
        endpoint: impl Into<String>,
    ) -> Result<Self> {
        let project_id = project_id.into();
        let location = location.into();
        let queue_name = queue_name.into();

        for (field, value) in [
            ("project_id", &project_id),
            ("location", &location),
            ("queue_name", &queue_name),
        ] {
            if value.trim().is_empty() || value.contains('/') {
                return Err(Error::Config(format!(
                    "Malformed queue path: {} '{}' must be a non-empty path segment",
                    field, value
                )));
            }
        }

        Ok(Self {
            project_id,
            location,
            queue_name,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth,
            http_client: crate::http_client(Duration::from_secs(30))?,
        })
    }

    /// Get the full queue path
    pub fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        )
    }

    /// Create a task on the queue
    ///
    /// A single `tasks.create` call. Cloud Tasks owns delivery and retries;
    /// a failed create is returned to the caller as-is. No task name is
    /// set, so identical calls create distinct tasks.
    ///
    /// # Returns
    ///
    /// The Cloud Tasks task name (e.g., "projects/.../locations/.../queues/.../tasks/...")
    pub async fn create_task(&self, task: &HttpTask) -> Result<String> {
        let api_url = format!("{}/v2/{}/tasks", self.endpoint, self.queue_path());
        let access_token = self.auth.access_token(CLOUD_PLATFORM_SCOPE).await?;

        let api_timer = ENQUEUE_DURATION.with_label_values(&["api"]).start_timer();
        let response = self
            .http_client
            .post(&api_url)
            .bearer_auth(access_token)
            .json(&task.to_create_request())
            .send()
            .await?;
        let status = response.status();
        drop(api_timer);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!(
                "Cloud Tasks API returned {}: {}",
                status, body
            )));
        }

        let task_response: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Api(format!("Failed to parse response: {}", e)))?;

        let task_name = task_response["name"]
            .as_str()
            .ok_or_else(|| Error::Api("No task name in response".to_string()))?
            .to_string();

        tracing::debug!(task_name = %task_name, "Cloud Tasks API call succeeded");
        Ok(task_name)
    }

    /// Push retry and rate limit settings to the queue
    ///
    /// Patches only the fields named in [`DispatchPolicy::UPDATE_MASK`].
    pub async fn apply_dispatch_policy(&self, policy: &DispatchPolicy) -> Result<()> {
        let api_url = format!(
            "{}/v2/{}?updateMask={}",
            self.endpoint,
            self.queue_path(),
            urlencoding::encode(DispatchPolicy::UPDATE_MASK)
        );
        let access_token = self.auth.access_token(CLOUD_PLATFORM_SCOPE).await?;

        let response = self
            .http_client
            .patch(&api_url)
            .bearer_auth(access_token)
            .json(&policy.to_queue_patch())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!(
                "Cloud Tasks API returned {} updating queue: {}",
                status, body
            )));
        }

        tracing::info!(
            queue = %self.queue_path(),
            max_attempts = policy.max_attempts,
            min_backoff_secs = policy.min_backoff.as_secs(),
            max_concurrent_dispatches = policy.max_concurrent_dispatches,
            "Applied dispatch policy to queue"
        );
        Ok(())
    }

    /// Health check for Cloud Tasks API reachability
    ///
    /// Performs a lightweight GET of the queue. Backs the readiness check.
    pub async fn health_check(&self) -> Result<()> {
        let api_url = format!("{}/v2/{}", self.endpoint, self.queue_path());

        let access_token = self
            .auth
            .access_token(CLOUD_PLATFORM_SCOPE)
            .await
            .map_err(|e| Error::Internal(format!("Failed to get access token: {}", e)))?;

        let response = self
            .http_client
            .get(&api_url)
            .bearer_auth(access_token)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Cloud Tasks API unreachable: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Internal(format!(
                "Cloud Tasks API returned non-success: {}",
                response.status()
            )))
        }
    }
}
