//! Interfaces to the systems webhook delivery depends on.
//!
//! Production implementations live in the `persistence` and `api` crates;
//! in-memory versions for tests and local runs are in [`super::memory`].

use std::net::SocketAddr;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::errors::{AttachmentUrlError, QueueError, StoreError, TransportError};
use crate::models::{AttachmentUrls, WebhookConfig, WebhookSubmission};

/// Read-only access to persisted submissions.
#[async_trait::async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Fetch a submission, `Ok(None)` when it does not exist.
    async fn get_submission_by_id(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<WebhookSubmission>, StoreError>;
}

/// Read-only access to form webhook settings.
#[async_trait::async_trait]
pub trait FormConfigStore: Send + Sync {
    /// Webhook settings for a form, `Ok(None)` when the form does not exist.
    async fn get_webhook_config(&self, form_id: Uuid) -> Result<Option<WebhookConfig>, StoreError>;
}

/// Generates time-limited download links for submission attachments.
#[async_trait::async_trait]
pub trait AttachmentUrlGenerator: Send + Sync {
    async fn generate_attachment_urls(
        &self,
        submission: &WebhookSubmission,
    ) -> Result<AttachmentUrls, AttachmentUrlError>;
}

/// DNS resolution used by the URL validator.
#[async_trait::async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>>;
}

/// A signed webhook POST ready to be sent.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: Url,
    pub body: String,
    /// Value of the signature header.
    pub signature: String,
    /// Addresses the URL was validated against; the connection must use one of them.
    pub resolved_addrs: Vec<SocketAddr>,
}

/// Receiver's answer, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHttpResponse {
    pub status: u16,
    pub body: String,
}

/// Outbound HTTPS client.
#[async_trait::async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, request: WebhookRequest) -> Result<WebhookHttpResponse, TransportError>;
}

/// A message leased from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Handle used to delete or release this delivery of the message.
    pub receipt: String,
    pub body: String,
    /// How many times the message has been received, including this one.
    pub receive_count: u32,
}

/// Durable queue with delayed delivery and visibility timeouts.
///
/// A received message stays invisible for the visibility timeout. If it is
/// neither deleted nor released in that time it becomes visible again.
#[async_trait::async_trait]
pub trait WebhookQueue: Send + Sync {
    /// Push a message that becomes visible after `delay`.
    async fn push(&self, body: &str, delay: Duration) -> Result<(), QueueError>;

    /// Lease up to `max_messages` visible messages.
    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Remove a received message permanently.
    async fn delete(&self, receipt: &str) -> Result<(), QueueError>;

    /// Make a received message visible again after `delay`.
    async fn release(&self, receipt: &str, delay: Duration) -> Result<(), QueueError>;

    /// Number of messages in the queue, visible or not.
    async fn depth(&self) -> Result<QueueDepth, QueueError>;
}

/// Queue size snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub total: u64,
    pub visible: u64,
}
