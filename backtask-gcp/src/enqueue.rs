//! Enqueue one backup task for the dispatched function

use crate::auth::TokenSource;
use crate::config::GcpConfig;
use crate::functions::FunctionsClient;
use crate::metrics::{ENQUEUE_DURATION, ENQUEUE_TOTAL};
use crate::queue::CloudTasksQueue;
use crate::task::HttpTask;
use crate::Result;
use std::sync::Arc;

/// Resolves the target function and enqueues tasks against it
///
/// Built once at startup and shared by the entry points.
#[derive(Clone)]
pub struct Enqueuer {
    config: GcpConfig,
    functions: FunctionsClient,
    queue: CloudTasksQueue,
}

impl Enqueuer {
    /// Create an enqueuer talking to the production Google APIs
    pub fn new(config: GcpConfig, auth: Arc<dyn TokenSource>) -> Result<Self> {
        let functions = FunctionsClient::new(auth.clone())?;
        let queue = CloudTasksQueue::new(
            config.project_id.clone(),
            config.location.clone(),
            config.queue_name.clone(),
            auth,
        )?;
        Self::from_parts(config, functions, queue)
    }

    /// Assemble an enqueuer from preconfigured clients
    pub fn from_parts(
        config: GcpConfig,
        functions: FunctionsClient,
        queue: CloudTasksQueue,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            functions,
            queue,
        })
    }

    pub fn config(&self) -> &GcpConfig {
        &self.config
    }

    pub fn queue(&self) -> &CloudTasksQueue {
        &self.queue
    }

    /// Enqueue one backup task
    ///
    /// Resolves the target function's URL, builds the task and creates it on
    /// the queue. Each call creates a new task.
    ///
    /// # Returns
    ///
    /// The Cloud Tasks task name
    pub async fn enqueue(&self) -> Result<String> {
        let _total_timer = ENQUEUE_DURATION.with_label_values(&["total"]).start_timer();

        let result = self.resolve_and_create().await;

        match &result {
            Ok(task_name) => {
                ENQUEUE_TOTAL.with_label_values(&["success"]).inc();
                tracing::info!(
                    task_name = %task_name,
                    queue = %self.queue.queue_path(),
                    "Task enqueued successfully"
                );
            }
            Err(e) => {
                ENQUEUE_TOTAL.with_label_values(&["failure"]).inc();
                tracing::error!(
                    queue = %self.queue.queue_path(),
                    error = %e,
                    "Task enqueue failed"
                );
            }
        }

        result
    }

    async fn resolve_and_create(&self) -> Result<String> {
        let target_url = self
            .functions
            .function_url(
                &self.config.project_id,
                &self.config.location,
                &self.config.target_function,
            )
            .await?;

        let task = HttpTask::backup(target_url, self.config.service_account_email.clone())?;

        tracing::info!(
            target_url = %task.url,
            service_account = %task.oidc_service_account_email,
            queue = %self.queue.queue_path(),
            "Enqueueing backup task"
        );

        self.queue.create_task(&task).await
    }
}
