//! Background job scheduler and job implementations.

mod queue_metrics;
mod scheduler;
mod webhook_queue;

pub use queue_metrics::QueueMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
pub use webhook_queue::WebhookQueueConsumerJob;
