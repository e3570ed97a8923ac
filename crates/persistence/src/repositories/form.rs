//! Form webhook settings repository.

use domain::errors::StoreError;
use domain::models::WebhookConfig;
use domain::services::FormConfigStore;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::FormWebhookEntity;
use crate::metrics::QueryTimer;

/// Read-only access to the webhook settings of forms.
#[derive(Clone)]
pub struct FormWebhookRepository {
    pool: PgPool,
}

impl FormWebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, form_id: Uuid) -> Result<Option<FormWebhookEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_form_webhook_by_id");
        let result = sqlx::query_as::<_, FormWebhookEntity>(
            r#"
            SELECT id, webhook_url, webhook_retries_enabled
            FROM forms
            WHERE id = $1
            "#,
        )
        .bind(form_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[async_trait::async_trait]
impl FormConfigStore for FormWebhookRepository {
    async fn get_webhook_config(&self, form_id: Uuid) -> Result<Option<WebhookConfig>, StoreError> {
        self.find_by_id(form_id)
            .await
            .map(|entity| entity.map(WebhookConfig::from))
            .map_err(|e| {
                tracing::error!(form_id = %form_id, error = %e, "Failed to load form webhook settings");
                StoreError::Unavailable(e.to_string())
            })
    }
}
