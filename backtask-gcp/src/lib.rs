//! # Backtask GCP
//!
//! Google Cloud adapter for backtask: resolves Cloud Functions invocation
//! URLs through the control-plane API and enqueues HTTP tasks on Cloud Tasks.
//!
//! Retry, backoff, rate limiting and delivery are owned by Cloud Tasks. This
//! crate only builds the task and hands it over.

pub mod auth;
pub mod config;
pub mod enqueue;
pub mod functions;
pub mod metrics;
pub mod queue;
pub mod task;

// Re-export commonly used types
pub use auth::{CredentialSources, GcpAuth, TokenSource};
pub use config::GcpConfig;
pub use enqueue::Enqueuer;
pub use functions::FunctionsClient;
pub use queue::CloudTasksQueue;
pub use task::{DispatchPolicy, HttpMethod, HttpTask};

/// OAuth2 scope used for every control-plane and Cloud Tasks call
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Result type for GCP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for GCP operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("GCP API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Build the shared HTTP client used by the API clients.
pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))
}
