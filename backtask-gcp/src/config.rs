//! Enqueue configuration loading and validation.

use crate::{Error, Result};

/// Region the queue and the target function live in
pub const LOCATION: &str = "us-central1";

/// Queue tasks are enqueued on
pub const QUEUE_NAME: &str = "processtask";

/// Function the tasks are dispatched to
pub const TARGET_FUNCTION: &str = "processtask";

/// Configuration for enqueueing backup tasks.
///
/// Location, queue and target function are fixed; only the project and the
/// OIDC service account vary between deployments.
#[derive(Debug, Clone)]
pub struct GcpConfig {
    pub project_id: String,
    pub location: String,
    pub queue_name: String,
    pub target_function: String,
    pub service_account_email: String,
}

impl GcpConfig {
    pub fn new(project_id: impl Into<String>, service_account_email: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: LOCATION.to_string(),
            queue_name: QUEUE_NAME.to_string(),
            target_function: TARGET_FUNCTION.to_string(),
            service_account_email: service_account_email.into(),
        }
    }

    /// Load from `PROJECT_ID` and `SERVICE_ACCOUNT_EMAIL`
    ///
    /// `default_project` (usually the credentials' project) is used when
    /// `PROJECT_ID` is unset.
    pub fn from_env(default_project: Option<&str>) -> Result<Self> {
        let project_id = std::env::var("PROJECT_ID")
            .ok()
            .or_else(|| default_project.map(str::to_string))
            .ok_or_else(|| Error::Config("PROJECT_ID not set".into()))?;
        let service_account_email = std::env::var("SERVICE_ACCOUNT_EMAIL")
            .map_err(|_| Error::Config("SERVICE_ACCOUNT_EMAIL not set".into()))?;

        let cfg = Self::new(project_id, service_account_email);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(Error::Config("project_id cannot be empty".into()));
        }
        if self.location.trim().is_empty() {
            return Err(Error::Config("location cannot be empty".into()));
        }
        if self.queue_name.trim().is_empty() {
            return Err(Error::Config("queue_name cannot be empty".into()));
        }
        if self.target_function.trim().is_empty() {
            return Err(Error::Config("target_function cannot be empty".into()));
        }

        // Validate service account email format
        if !self.service_account_email.contains('@') {
            return Err(Error::Config(
                "service_account_email must be a valid email".into(),
            ));
        }

        Ok(())
    }
}
