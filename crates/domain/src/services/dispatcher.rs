//! Webhook dispatcher.
//!
//! Performs a single delivery attempt for a submission:
//! 1. Validates the URL (HTTPS, public addresses only)
//! 2. Generates attachment download links when the submission has attachments
//! 3. Builds the JSON payload
//! 4. Checks the per-host circuit breaker, if enabled
//! 5. Signs the body and POSTs it, pinned to the validated addresses
//! 6. Classifies the outcome
//!
//! Every attempt is logged with form id, submission id, status and latency.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use shared::crypto::{SignatureInput, WebhookSigner};
use tracing::{info, warn};

use super::circuit_breaker::CircuitBreaker;
use super::collaborators::{AttachmentUrlGenerator, WebhookRequest, WebhookTransport};
use super::url_validator::UrlValidator;
use crate::errors::WebhookError;
use crate::models::queue_message::now_ms;
use crate::models::{AttachmentUrls, WebhookPayload, WebhookSubmission, WebhookSuccess};

/// Longest receiver response body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Sends one webhook attempt and classifies the result.
pub struct WebhookDispatcher {
    validator: UrlValidator,
    attachments: Arc<dyn AttachmentUrlGenerator>,
    transport: Arc<dyn WebhookTransport>,
    signer: WebhookSigner,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl WebhookDispatcher {
    pub fn new(
        validator: UrlValidator,
        attachments: Arc<dyn AttachmentUrlGenerator>,
        transport: Arc<dyn WebhookTransport>,
        signer: WebhookSigner,
    ) -> Self {
        Self {
            validator,
            attachments,
            transport,
            signer,
            breaker: None,
        }
    }

    /// Guard receivers with a per-host circuit breaker.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Attempt delivery of `submission` to `url`.
    pub async fn dispatch(
        &self,
        submission: &WebhookSubmission,
        url: &str,
    ) -> Result<WebhookSuccess, WebhookError> {
        let start = Instant::now();
        let result = self.attempt(submission, url).await;
        let latency = start.elapsed();

        self.record(submission, url, latency, &result);
        result
    }

    async fn attempt(
        &self,
        submission: &WebhookSubmission,
        url: &str,
    ) -> Result<WebhookSuccess, WebhookError> {
        let validated = self.validator.validate(url).await?;

        let attachment_urls = if submission.has_attachments() {
            self.attachments
                .generate_attachment_urls(submission)
                .await?
        } else {
            AttachmentUrls::new()
        };

        let payload = WebhookPayload::new(submission, attachment_urls);
        let body = serde_json::to_string(&payload)
            .map_err(|e| WebhookError::unknown(format!("failed to serialise payload: {e}")))?;

        let host = validated.host().to_string();
        if let Some(breaker) = &self.breaker {
            breaker.check(&host).await?;
        }

        let submission_id = submission.submission_id.to_string();
        let form_id = submission.form_id.to_string();
        // Signed over the URL as configured, which is what receivers know.
        let signature = self.signer.signature_header(&SignatureInput {
            url,
            submission_id: &submission_id,
            form_id: &form_id,
            epoch_ms: now_ms(),
            body: body.as_bytes(),
        });

        let start = Instant::now();
        let response = self
            .transport
            .post(WebhookRequest {
                url: validated.url.clone(),
                body,
                signature,
                resolved_addrs: validated.addrs,
            })
            .await;
        let latency = start.elapsed();

        let outcome = match response {
            Ok(response) if (200..300).contains(&response.status) => Ok(WebhookSuccess {
                status: response.status,
                latency,
            }),
            Ok(response) => Err(WebhookError::http(
                Some(response.status),
                format!(
                    "receiver responded with status {}: {}",
                    response.status,
                    truncate(&response.body, MAX_ERROR_BODY_CHARS)
                ),
            )),
            Err(e) => Err(e.into()),
        };

        if let Some(breaker) = &self.breaker {
            match &outcome {
                Ok(_) => breaker.record_success(&host).await,
                Err(_) => breaker.record_failure(&host).await,
            }
        }

        outcome
    }

    fn record(
        &self,
        submission: &WebhookSubmission,
        url: &str,
        latency: Duration,
        result: &Result<WebhookSuccess, WebhookError>,
    ) {
        let latency_ms = latency.as_millis() as u64;
        let outcome = match result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };

        counter!("webhook_attempts_total", "outcome" => outcome).increment(1);
        histogram!("webhook_attempt_duration_seconds", "outcome" => outcome)
            .record(latency.as_secs_f64());

        match result {
            Ok(success) => info!(
                form_id = %submission.form_id,
                submission_id = %submission.submission_id,
                status = success.status,
                latency_ms = latency_ms,
                "Webhook delivered"
            ),
            Err(e) => {
                let status = match e {
                    WebhookError::Http { status, .. } => *status,
                    _ => None,
                };
                warn!(
                    form_id = %submission.form_id,
                    submission_id = %submission.submission_id,
                    webhook_url = %redact(url),
                    status = ?status,
                    latency_ms = latency_ms,
                    error_kind = e.kind(),
                    error = %e,
                    "Webhook attempt failed"
                );
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Strip query string and credentials before logging a receiver URL.
fn redact(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
