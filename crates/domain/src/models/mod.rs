//! Domain models for webhook delivery.

pub mod queue_message;
pub mod submission;
pub mod webhook;

pub use queue_message::{RetryPolicy, Schedule, WebhookQueueMessage};
pub use submission::{AttachmentUrls, SubmissionAttachment, WebhookConfig, WebhookSubmission};
pub use webhook::{DeliveryState, WebhookPayload, WebhookSuccess};
