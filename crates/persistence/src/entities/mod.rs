//! Database row mappings.

pub mod form;
pub mod submission;
pub mod webhook_queue;

pub use form::FormWebhookEntity;
pub use submission::SubmissionEntity;
pub use webhook_queue::WebhookQueueEntity;
