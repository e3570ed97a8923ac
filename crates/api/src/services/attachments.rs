//! Signed, time-limited attachment download links.
//!
//! A link has the form `{base_url}/{object_key}?expires={epoch_s}&signature={hex}`
//! where the signature is HMAC-SHA256 over `"{object_key}:{expires}"` with
//! the shared attachment secret. The file service verifies the same way.

use chrono::Utc;
use url::Url;

use domain::errors::AttachmentUrlError;
use domain::models::{AttachmentUrls, WebhookSubmission};
use domain::services::AttachmentUrlGenerator;
use shared::crypto::hmac_sha256_hex;

use crate::config::AttachmentsConfig;

/// Generates HMAC-signed download links for submission attachments.
#[derive(Debug, Clone)]
pub struct SignedAttachmentUrlGenerator {
    base_url: Option<Url>,
    secret: String,
    expiry_secs: i64,
}

impl SignedAttachmentUrlGenerator {
    pub fn new(config: &AttachmentsConfig) -> Self {
        let base_url = Url::parse(config.base_url.trim())
            .ok()
            .filter(|u| !u.cannot_be_a_base());
        Self {
            base_url,
            secret: config.signing_secret.clone(),
            expiry_secs: config.url_expiry_secs as i64,
        }
    }

    /// Whether links can be produced at all.
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && !self.secret.is_empty()
    }

    /// Signed link for `object_key`, valid until `expires` (epoch seconds).
    pub fn signed_url(&self, object_key: &str, expires: i64) -> Result<String, AttachmentUrlError> {
        let base = match (&self.base_url, self.secret.is_empty()) {
            (Some(base), false) => base,
            _ => {
                return Err(AttachmentUrlError(
                    "attachment links are not configured".to_string(),
                ))
            }
        };

        let key = object_key.trim().trim_matches('/');
        if key.is_empty() {
            return Err(AttachmentUrlError("attachment object key is empty".to_string()));
        }

        let signature = hmac_sha256_hex(
            self.secret.as_bytes(),
            format!("{key}:{expires}").as_bytes(),
        )
        .map_err(|e| AttachmentUrlError(e.to_string()))?;

        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| AttachmentUrlError("attachment base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);

        Ok(url.into())
    }
}

#[async_trait::async_trait]
impl AttachmentUrlGenerator for SignedAttachmentUrlGenerator {
    async fn generate_attachment_urls(
        &self,
        submission: &WebhookSubmission,
    ) -> Result<AttachmentUrls, AttachmentUrlError> {
        let expires = Utc::now().timestamp() + self.expiry_secs;
        submission
            .attachments
            .iter()
            .map(|a| {
                self.signed_url(&a.object_key, expires)
                    .map(|url| (a.field_id.clone(), url))
            })
            .collect()
    }
}
