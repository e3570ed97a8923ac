//! Submission repository.

use domain::errors::StoreError;
use domain::models::WebhookSubmission;
use domain::services::SubmissionStore;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::SubmissionEntity;
use crate::metrics::QueryTimer;

/// Read-only access to persisted submissions.
#[derive(Clone)]
pub struct SubmissionRepository {
    pool: PgPool,
}

impl SubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<SubmissionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_submission_by_id");
        let result = sqlx::query_as::<_, SubmissionEntity>(
            r#"
            SELECT id, form_id, responses, attachments, created_at
            FROM submissions
            WHERE id = $1
            "#,
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[async_trait::async_trait]
impl SubmissionStore for SubmissionRepository {
    async fn get_submission_by_id(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<WebhookSubmission>, StoreError> {
        let entity = self.find_by_id(submission_id).await.map_err(|e| {
            tracing::error!(submission_id = %submission_id, error = %e, "Failed to load submission");
            StoreError::Unavailable(e.to_string())
        })?;

        entity
            .map(WebhookSubmission::try_from)
            .transpose()
            .map_err(|e| {
                tracing::warn!(submission_id = %submission_id, error = %e, "Submission row is malformed");
                StoreError::Malformed(format!("submission {submission_id}: {e}"))
            })
    }
}
