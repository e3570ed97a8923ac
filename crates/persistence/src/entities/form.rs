//! Form webhook settings entity.

use domain::models::WebhookConfig;
use sqlx::FromRow;
use uuid::Uuid;

/// Webhook columns of the forms table.
#[derive(Debug, Clone, FromRow)]
pub struct FormWebhookEntity {
    pub id: Uuid,
    pub webhook_url: Option<String>,
    pub webhook_retries_enabled: bool,
}

impl From<FormWebhookEntity> for WebhookConfig {
    fn from(entity: FormWebhookEntity) -> Self {
        Self {
            url: entity.webhook_url,
            retries_enabled: entity.webhook_retries_enabled,
        }
    }
}
