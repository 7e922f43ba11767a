//! Processing of dispatched tasks

use crate::types::TaskHeaders;
use async_trait::async_trait;
use tracing::info;

/// Work performed for each task Cloud Tasks delivers
///
/// Returning an error answers the delivery with a 500, which makes Cloud
/// Tasks retry according to the queue's dispatch policy.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, data: &serde_json::Value, task: &TaskHeaders) -> anyhow::Result<()>;
}

/// Logs each delivered payload and does nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProcessor;

#[async_trait]
impl TaskProcessor for LoggingProcessor {
    async fn process(&self, data: &serde_json::Value, task: &TaskHeaders) -> anyhow::Result<()> {
        info!(
            task_name = ?task.task_name,
            queue = ?task.queue_name,
            retry_count = ?task.retry_count,
            "Processing task"
        );
        info!(data = %data, "Task data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_processor_accepts_any_payload() {
        let processor = LoggingProcessor;
        let task = TaskHeaders::default();

        processor
            .process(&serde_json::json!("test_data"), &task)
            .await
            .unwrap();
        processor
            .process(&serde_json::json!({"nested": [1, 2, 3]}), &task)
            .await
            .unwrap();
        processor.process(&serde_json::Value::Null, &task).await.unwrap();
    }
}
