//! Webhook queue entity.

use domain::services::ReceivedMessage;
use sqlx::FromRow;
use uuid::Uuid;

/// A leased row of the webhook_queue table.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookQueueEntity {
    pub id: i64,
    pub body: String,
    pub receipt: Uuid,
    pub receive_count: i32,
}

impl From<WebhookQueueEntity> for ReceivedMessage {
    fn from(entity: WebhookQueueEntity) -> Self {
        Self {
            receipt: entity.receipt.to_string(),
            body: entity.body,
            receive_count: u32::try_from(entity.receive_count).unwrap_or(0),
        }
    }
}
