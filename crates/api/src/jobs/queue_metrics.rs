//! Queue depth and connection pool gauges.

use std::sync::Arc;

use sqlx::PgPool;

use domain::services::WebhookQueue;

use super::scheduler::{Job, JobFrequency};
use crate::middleware::record_queue_depth;

/// Publishes retry queue depth and pool statistics.
pub struct QueueMetricsJob {
    queue: Arc<dyn WebhookQueue>,
    pool: Option<PgPool>,
}

impl QueueMetricsJob {
    pub fn new(queue: Arc<dyn WebhookQueue>, pool: Option<PgPool>) -> Self {
        Self { queue, pool }
    }
}

#[async_trait::async_trait]
impl Job for QueueMetricsJob {
    fn name(&self) -> &'static str {
        "queue_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(10)
    }

    async fn execute(&self) -> Result<(), String> {
        if let Some(pool) = &self.pool {
            persistence::metrics::record_pool_metrics(pool);
        }

        let depth = self
            .queue
            .depth()
            .await
            .map_err(|e| format!("Failed to read webhook queue depth: {e}"))?;
        record_queue_depth(depth);
        Ok(())
    }
}
