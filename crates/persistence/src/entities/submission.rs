//! Submission entity.

use chrono::{DateTime, Utc};
use domain::models::{SubmissionAttachment, WebhookSubmission};
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for the submissions table.
#[derive(Debug, Clone, FromRow)]
pub struct SubmissionEntity {
    pub id: Uuid,
    pub form_id: Uuid,
    pub responses: serde_json::Value,
    pub attachments: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SubmissionEntity> for WebhookSubmission {
    type Error = serde_json::Error;

    fn try_from(entity: SubmissionEntity) -> Result<Self, Self::Error> {
        let attachments: Vec<SubmissionAttachment> = if entity.attachments.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(entity.attachments)?
        };

        Ok(Self {
            submission_id: entity.id,
            form_id: entity.form_id,
            created_at: entity.created_at,
            responses: entity.responses,
            attachments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(attachments: serde_json::Value) -> SubmissionEntity {
        SubmissionEntity {
            id: Uuid::new_v4(),
            form_id: Uuid::new_v4(),
            responses: json!([{"question": "Name", "answer": "Ada"}]),
            attachments,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_converts_attachments() {
        let submission = WebhookSubmission::try_from(entity(json!([
            {"fieldId": "f1", "filename": "cv.pdf", "objectKey": "forms/cv.pdf"}
        ])))
        .unwrap();

        assert_eq!(submission.attachments.len(), 1);
        assert_eq!(submission.attachments[0].object_key, "forms/cv.pdf");
        assert_eq!(submission.responses[0]["answer"], "Ada");
    }

    #[test]
    fn test_null_attachments_are_empty() {
        let submission = WebhookSubmission::try_from(entity(serde_json::Value::Null)).unwrap();
        assert!(!submission.has_attachments());
    }

    #[test]
    fn test_malformed_attachments_fail() {
        assert!(WebhookSubmission::try_from(entity(json!({"oops": true}))).is_err());
    }
}
