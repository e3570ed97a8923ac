//! Webhook orchestration.
//!
//! Entry point after a submission is accepted, and the handler the queue
//! consumer calls for due retry messages. Decides whether a webhook fires,
//! runs the dispatcher, and on retryable failure hands a new or incremented
//! [`WebhookQueueMessage`] to the producer.
//!
//! Per submission the delivery moves through:
//!
//! ```text
//! Pending -> Delivered
//!         -> RetryScheduled -> Delivered | RetryScheduled | Abandoned
//!         -> Abandoned
//! ```

use std::sync::Arc;

use metrics::counter;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::collaborators::{FormConfigStore, SubmissionStore};
use super::dispatcher::WebhookDispatcher;
use super::queue_bridge::WebhookProducer;
use crate::errors::{ErrorClass, WebhookError};
use crate::models::{DeliveryState, RetryPolicy, WebhookQueueMessage, WebhookSubmission};

/// Coordinates delivery attempts and retry scheduling.
pub struct WebhookService {
    submissions: Arc<dyn SubmissionStore>,
    forms: Arc<dyn FormConfigStore>,
    dispatcher: Arc<WebhookDispatcher>,
    producer: WebhookProducer,
    policy: RetryPolicy,
}

impl WebhookService {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        forms: Arc<dyn FormConfigStore>,
        dispatcher: Arc<WebhookDispatcher>,
        producer: WebhookProducer,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            submissions,
            forms,
            dispatcher,
            producer,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// First delivery attempt for a newly accepted submission.
    ///
    /// A failure to queue the retry is logged and reported as
    /// [`DeliveryState::Abandoned`], never as an error.
    pub async fn send_webhook(&self, submission_id: Uuid) -> Result<DeliveryState, WebhookError> {
        let (submission, url) = self.load_target(submission_id).await.inspect_err(|e| {
            self.log_abandoned(submission_id, None, e);
        })?;

        match self.dispatcher.dispatch(&submission, &url).await {
            Ok(success) => Ok(DeliveryState::Delivered {
                status: success.status,
            }),
            Err(e) if e.is_retryable() => {
                let message = WebhookQueueMessage::from_submission_id(submission_id, &self.policy)
                    .inspect_err(|exhausted| {
                        self.log_abandoned(submission_id, Some(submission.form_id), exhausted)
                    })?;

                match self.producer.enqueue(&message).await {
                    Ok(()) => Ok(self.retry_scheduled(&submission, &message, &e)),
                    Err(push_error) => {
                        self.log_abandoned(submission_id, Some(submission.form_id), &push_error);
                        Ok(DeliveryState::Abandoned)
                    }
                }
            }
            Err(e) => {
                self.log_abandoned(submission_id, Some(submission.form_id), &e);
                Err(e)
            }
        }
    }

    /// Retry attempt for a due queue message.
    ///
    /// The submission and form settings are re-read so the attempt reflects
    /// the latest persisted state. Queue push failures are returned so the
    /// caller can leave the message for redelivery.
    pub async fn retry_webhook(
        &self,
        message: &WebhookQueueMessage,
    ) -> Result<DeliveryState, WebhookError> {
        let submission_id = message.submission_id();
        let (submission, url) = self.load_target(submission_id).await.inspect_err(|e| {
            self.log_abandoned(submission_id, None, e);
        })?;

        match self.dispatcher.dispatch(&submission, &url).await {
            Ok(success) => {
                info!(
                    form_id = %submission.form_id,
                    submission_id = %submission_id,
                    attempt = message.previous_attempts().len() + 2,
                    "Webhook delivered after retry"
                );
                Ok(DeliveryState::Delivered {
                    status: success.status,
                })
            }
            Err(e) if e.is_retryable() => {
                let next = message.increment_attempts(&self.policy).inspect_err(|exhausted| {
                    self.log_abandoned(submission_id, Some(submission.form_id), exhausted)
                })?;

                self.producer.enqueue(&next).await.inspect_err(|push_error| {
                    error!(
                        form_id = %submission.form_id,
                        submission_id = %submission_id,
                        error = %push_error,
                        "Failed to re-enqueue webhook retry, leaving message for redelivery"
                    );
                })?;

                Ok(self.retry_scheduled(&submission, &next, &e))
            }
            Err(e) => {
                self.log_abandoned(submission_id, Some(submission.form_id), &e);
                Err(e)
            }
        }
    }

    /// Fetch the submission and the form's webhook URL, applying the
    /// configuration checks.
    async fn load_target(
        &self,
        submission_id: Uuid,
    ) -> Result<(WebhookSubmission, String), WebhookError> {
        let submission = self
            .submissions
            .get_submission_by_id(submission_id)
            .await?
            .ok_or(WebhookError::SubmissionNotFound { submission_id })?;

        let form_id = submission.form_id;
        let config = self
            .forms
            .get_webhook_config(form_id)
            .await?
            .unwrap_or_default();

        let url = config
            .url()
            .map(str::to_string)
            .ok_or(WebhookError::NotConfigured { form_id })?;

        if !config.retries_enabled {
            return Err(WebhookError::RetriesNotEnabled { form_id });
        }

        Ok((submission, url))
    }

    fn retry_scheduled(
        &self,
        submission: &WebhookSubmission,
        message: &WebhookQueueMessage,
        cause: &WebhookError,
    ) -> DeliveryState {
        counter!("webhook_retries_scheduled_total").increment(1);
        warn!(
            form_id = %submission.form_id,
            submission_id = %submission.submission_id,
            attempt = message.previous_attempts().len() + 1,
            next_attempt = message.next_attempt(),
            error = %cause,
            "Webhook attempt failed, retry scheduled"
        );
        DeliveryState::RetryScheduled {
            next_attempt: message.next_attempt(),
        }
    }

    fn log_abandoned(&self, submission_id: Uuid, form_id: Option<Uuid>, e: &WebhookError) {
        counter!("webhook_abandoned_total", "reason" => e.kind()).increment(1);
        let form_id = form_id.map(|id| id.to_string()).unwrap_or_default();

        match e.class() {
            ErrorClass::Exhausted => error!(
                form_id = %form_id,
                submission_id = %submission_id,
                error = %e,
                "Webhook retries exhausted, delivery permanently failed"
            ),
            ErrorClass::Infrastructure => error!(
                form_id = %form_id,
                submission_id = %submission_id,
                error_kind = e.kind(),
                error = %e,
                "Webhook retry could not be scheduled"
            ),
            ErrorClass::NonRetryable | ErrorClass::Retryable => warn!(
                form_id = %form_id,
                submission_id = %submission_id,
                error_kind = e.kind(),
                error = %e,
                "Webhook delivery abandoned"
            ),
        }
    }
}
