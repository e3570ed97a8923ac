//! Retry queue consumer job.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use domain::services::WebhookConsumer;

use super::scheduler::{Job, JobFrequency};

/// Upper bound on batches drained in one run, so shutdown is not held up by
/// a long backlog.
const MAX_BATCHES_PER_RUN: usize = 20;

/// Polls the retry queue and redelivers due webhooks.
pub struct WebhookQueueConsumerJob {
    consumer: Arc<WebhookConsumer>,
    poll_interval: Duration,
}

impl WebhookQueueConsumerJob {
    pub fn new(consumer: Arc<WebhookConsumer>, poll_interval: Duration) -> Self {
        Self {
            consumer,
            poll_interval,
        }
    }
}

#[async_trait::async_trait]
impl Job for WebhookQueueConsumerJob {
    fn name(&self) -> &'static str {
        "webhook_queue_consumer"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.poll_interval.as_secs())
    }

    /// Drains full batches back to back, stopping at the first short one.
    async fn execute(&self) -> Result<(), String> {
        let batch_size = self.consumer.settings().batch_size;

        for _ in 0..MAX_BATCHES_PER_RUN {
            let summary = self
                .consumer
                .poll_once()
                .await
                .map_err(|e| format!("Failed to poll webhook queue: {e}"))?;

            if summary.received > 0 {
                info!(
                    received = summary.received,
                    acked = summary.acked,
                    released = summary.released,
                    retained = summary.retained,
                    "Processed webhook retry batch"
                );
            }

            if summary.received < batch_size {
                break;
            }
        }

        Ok(())
    }
}
