//! Outbound webhook payload and per-attempt outcomes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::submission::{AttachmentUrls, WebhookSubmission};

/// JSON body POSTed to the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub data: WebhookPayloadData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayloadData {
    pub form_id: Uuid,
    pub submission_id: Uuid,
    pub created: DateTime<Utc>,
    pub responses: serde_json::Value,
    #[serde(default, skip_serializing_if = "AttachmentUrls::is_empty")]
    pub attachment_download_urls: AttachmentUrls,
}

impl WebhookPayload {
    pub fn new(submission: &WebhookSubmission, attachment_download_urls: AttachmentUrls) -> Self {
        Self {
            data: WebhookPayloadData {
                form_id: submission.form_id,
                submission_id: submission.submission_id,
                created: submission.created_at,
                responses: submission.responses.clone(),
                attachment_download_urls,
            },
        }
    }
}

/// Metadata of a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookSuccess {
    pub status: u16,
    pub latency: Duration,
}

/// Where a submission's delivery ended up after one call into the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Receiver acknowledged with a 2xx.
    Delivered { status: u16 },
    /// Attempt failed; a retry message is queued for `next_attempt` (epoch ms).
    RetryScheduled { next_attempt: i64 },
    /// Attempt failed and no retry could be queued.
    Abandoned,
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryState::Delivered { .. } => write!(f, "delivered"),
            DeliveryState::RetryScheduled { .. } => write!(f, "retry_scheduled"),
            DeliveryState::Abandoned => write!(f, "abandoned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::submission::SubmissionAttachment;

    fn submission() -> WebhookSubmission {
        WebhookSubmission {
            submission_id: Uuid::parse_str("7d1f5a3e-0d6c-4c1b-9b8e-2f9a1c3b4d5e").unwrap(),
            form_id: Uuid::parse_str("1e2d3c4b-5a69-4788-9a0b-c1d2e3f4a5b6").unwrap(),
            created_at: DateTime::parse_from_rfc3339("2023-12-06T16:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            responses: serde_json::json!([{"question": "Name", "answer": "Ada"}]),
            attachments: vec![],
        }
    }

    #[test]
    fn test_payload_serialization_uses_camel_case() {
        let payload = WebhookPayload::new(&submission(), AttachmentUrls::new());
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["data"]["formId"], "1e2d3c4b-5a69-4788-9a0b-c1d2e3f4a5b6");
        assert_eq!(json["data"]["submissionId"], "7d1f5a3e-0d6c-4c1b-9b8e-2f9a1c3b4d5e");
        assert_eq!(json["data"]["responses"][0]["answer"], "Ada");
        assert!(json["data"].get("attachmentDownloadUrls").is_none());
    }

    #[test]
    fn test_payload_includes_attachment_urls_when_present() {
        let mut sub = submission();
        sub.attachments.push(SubmissionAttachment {
            field_id: "f1".into(),
            filename: "cv.pdf".into(),
            object_key: "forms/cv.pdf".into(),
        });
        let mut urls = AttachmentUrls::new();
        urls.insert("f1".into(), "https://files.example.com/forms/cv.pdf?sig=1".into());

        let json = serde_json::to_value(WebhookPayload::new(&sub, urls)).unwrap();
        assert_eq!(
            json["data"]["attachmentDownloadUrls"]["f1"],
            "https://files.example.com/forms/cv.pdf?sig=1"
        );
    }

    #[test]
    fn test_delivery_state_display() {
        assert_eq!(DeliveryState::Delivered { status: 200 }.to_string(), "delivered");
        assert_eq!(DeliveryState::Abandoned.to_string(), "abandoned");
    }
}
