//! Read-only views of submissions and form webhook settings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attachment stored alongside a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAttachment {
    pub field_id: String,
    pub filename: String,
    /// Object storage key the download link is generated for.
    pub object_key: String,
}

/// Submission as seen by webhook delivery. Fetched fresh on every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSubmission {
    pub submission_id: Uuid,
    pub form_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Field responses exactly as persisted by the form application.
    pub responses: serde_json::Value,
    pub attachments: Vec<SubmissionAttachment>,
}

impl WebhookSubmission {
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Webhook settings of a form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub retries_enabled: bool,
}

impl WebhookConfig {
    /// Configured URL, treating blank strings as unset.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Download links keyed by attachment field id.
pub type AttachmentUrls = BTreeMap<String, String>;
