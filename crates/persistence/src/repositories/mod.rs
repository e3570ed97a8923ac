//! Repository implementations for database operations.

pub mod form;
pub mod submission;
pub mod webhook_queue;

pub use form::FormWebhookRepository;
pub use submission::SubmissionRepository;
pub use webhook_queue::WebhookQueueRepository;
