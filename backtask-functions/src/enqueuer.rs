//! Deferred enqueuer construction
//!
//! Credentials and enqueue configuration are resolved on first use instead
//! of at startup, so a server without working credentials still answers
//! `/processtask` and `/health`. A failed initialization is retried on the
//! next request.

use backtask_gcp::{Enqueuer, GcpAuth, GcpConfig, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;

type InitFuture = Pin<Box<dyn Future<Output = Result<Enqueuer>> + Send>>;
type InitFn = Box<dyn Fn() -> InitFuture + Send + Sync>;

/// An [`Enqueuer`] built on first use
pub struct LazyEnqueuer {
    cell: OnceCell<Enqueuer>,
    init: InitFn,
}

impl LazyEnqueuer {
    /// Wrap an already constructed enqueuer
    pub fn ready(enqueuer: Enqueuer) -> Self {
        Self {
            cell: OnceCell::from(enqueuer),
            ..Self::with_init(|| async {
                Err(backtask_gcp::Error::Internal(
                    "enqueuer already initialized".to_string(),
                ))
            })
        }
    }

    /// Build the enqueuer with `init` the first time it is needed
    pub fn with_init<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Enqueuer>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            init: Box::new(move || -> InitFuture { Box::pin(init()) }),
        }
    }

    /// Application Default Credentials plus `PROJECT_ID` /
    /// `SERVICE_ACCOUNT_EMAIL` from the environment
    pub fn application_default() -> Self {
        Self::with_init(|| async {
            let auth = Arc::new(GcpAuth::application_default().await?);
            let config = GcpConfig::from_env(auth.project_id())?;

            tracing::info!(
                project_id = %config.project_id,
                location = %config.location,
                queue = %config.queue_name,
                target_function = %config.target_function,
                "Enqueue configuration loaded"
            );

            Enqueuer::new(config, auth)
        })
    }

    /// The enqueuer, initializing it if needed
    pub async fn get(&self) -> Result<&Enqueuer> {
        self.cell.get_or_try_init(|| (self.init)()).await
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_failed_init_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let lazy = LazyEnqueuer::with_init(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(backtask_gcp::Error::Auth("no credentials".to_string())) }
        });

        assert!(matches!(lazy.get().await, Err(backtask_gcp::Error::Auth(_))));
        assert!(lazy.get().await.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!lazy.is_initialized());
    }

    #[tokio::test]
    async fn test_successful_init_runs_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let lazy = LazyEnqueuer::with_init(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                let auth: Arc<dyn backtask_gcp::TokenSource> = Arc::new(
                    GcpAuth::from_credentials_json(
                        r#"{"type":"authorized_user","client_id":"c","client_secret":"s","refresh_token":"r"}"#,
                    )?,
                );
                Enqueuer::new(
                    GcpConfig::new("proj-1", "backup@proj-1.iam.gserviceaccount.com"),
                    auth,
                )
            }
        });

        let enqueuer = lazy.get().await.unwrap();
        assert_eq!(enqueuer.config().project_id, "proj-1");
        lazy.get().await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(lazy.is_initialized());
    }
}
