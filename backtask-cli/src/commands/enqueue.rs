//! Enqueue command

use anyhow::{Context, Result};
use backtask_gcp::{DispatchPolicy, Enqueuer, GcpAuth, GcpConfig};
use std::sync::Arc;

/// Enqueue one task on the `processtask` queue of `project_id`
///
/// With `configure_queue`, the queue's retry and rate limits are updated to
/// the default dispatch policy first.
pub async fn execute(
    project_id: &str,
    service_account_email: &str,
    configure_queue: bool,
) -> Result<String> {
    let config = GcpConfig::new(project_id, service_account_email);
    config.validate()?;

    let auth = GcpAuth::application_default()
        .await
        .context("Failed to load application default credentials")?;
    let enqueuer = Enqueuer::new(config, Arc::new(auth))?;

    if configure_queue {
        enqueuer
            .queue()
            .apply_dispatch_policy(&DispatchPolicy::default())
            .await
            .context("Failed to configure queue")?;
    }

    let task_name = enqueuer.enqueue().await?;
    tracing::debug!(task_name = %task_name, "Created task");

    Ok(task_name)
}
