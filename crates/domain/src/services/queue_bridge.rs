//! Queue producer and consumer for webhook retries.
//!
//! The producer pushes a serialised [`WebhookQueueMessage`] with a delivery
//! delay matching its `nextAttempt`. The consumer leases messages, checks
//! whether they are due, and hands due messages to
//! [`WebhookService::retry_webhook`].

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::collaborators::{ReceivedMessage, WebhookQueue};
use super::webhook_service::WebhookService;
use crate::errors::{ErrorClass, QueueError, WebhookError};
use crate::models::queue_message::now_ms;
use crate::models::{Schedule, WebhookQueueMessage};

/// Pushes retry messages onto the queue.
#[derive(Clone)]
pub struct WebhookProducer {
    queue: Arc<dyn WebhookQueue>,
    max_delivery_delay: Duration,
}

impl WebhookProducer {
    /// `max_delivery_delay` caps the queue delay; longer waits are covered
    /// by the consumer releasing early messages again.
    pub fn new(queue: Arc<dyn WebhookQueue>, max_delivery_delay: Duration) -> Self {
        Self {
            queue,
            max_delivery_delay,
        }
    }

    pub async fn enqueue(&self, message: &WebhookQueueMessage) -> Result<(), WebhookError> {
        self.enqueue_at(message, now_ms()).await
    }

    pub async fn enqueue_at(
        &self,
        message: &WebhookQueueMessage,
        now: i64,
    ) -> Result<(), WebhookError> {
        let body = message.serialise()?;
        let delay = self.delay_until(message.next_attempt(), now);

        self.queue
            .push(&body, delay)
            .await
            .map_err(|e| WebhookError::push_to_queue(e.to_string()))?;

        debug!(
            submission_id = %message.submission_id(),
            next_attempt = message.next_attempt(),
            delay_ms = delay.as_millis() as u64,
            "Webhook retry message enqueued"
        );
        Ok(())
    }

    /// `next_attempt - now`, clamped to `[0, max_delivery_delay]`.
    fn delay_until(&self, next_attempt: i64, now: i64) -> Duration {
        let wait_ms = next_attempt.saturating_sub(now).max(0).unsigned_abs();
        Duration::from_millis(wait_ms).min(self.max_delivery_delay)
    }
}

/// Consumer tuning.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerSettings {
    /// Messages leased per poll.
    pub batch_size: usize,
    /// How long a leased message stays invisible to other consumers.
    pub visibility_timeout: Duration,
    /// Longest delay applied when releasing an early message.
    pub max_delivery_delay: Duration,
    /// A message still failing on infrastructure errors at this many
    /// receives is dropped instead of retained. Early releases count too.
    pub max_receive_count: u32,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            visibility_timeout: Duration::from_secs(120),
            max_delivery_delay: Duration::from_secs(900),
            max_receive_count: 10,
        }
    }
}

/// What to do with a leased message once handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerAction {
    /// Delete the message.
    Ack,
    /// Return the message to the queue, visible again after the delay.
    Release(Duration),
    /// Leave the lease to expire so the message is redelivered.
    Retain,
}

impl ConsumerAction {
    fn label(&self) -> &'static str {
        match self {
            ConsumerAction::Ack => "ack",
            ConsumerAction::Release(_) => "release",
            ConsumerAction::Retain => "retain",
        }
    }
}

/// Outcome counts for one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub received: usize,
    pub acked: usize,
    pub released: usize,
    pub retained: usize,
}

/// Leases retry messages and re-invokes delivery for due ones.
pub struct WebhookConsumer {
    queue: Arc<dyn WebhookQueue>,
    service: Arc<WebhookService>,
    settings: ConsumerSettings,
}

impl WebhookConsumer {
    pub fn new(
        queue: Arc<dyn WebhookQueue>,
        service: Arc<WebhookService>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            queue,
            service,
            settings,
        }
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    pub async fn handle_message(&self, raw: &str) -> ConsumerAction {
        self.handle_message_at(raw, now_ms()).await
    }

    /// Decide and perform the work for one raw message body.
    pub async fn handle_message_at(&self, raw: &str, now: i64) -> ConsumerAction {
        let message = match WebhookQueueMessage::deserialise(raw) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, body = %raw, "Dropping unparseable webhook queue message");
                return ConsumerAction::Ack;
            }
        };

        match message.schedule_at(now, self.service.policy().due_tolerance) {
            Schedule::Early { wait } => {
                debug!(
                    submission_id = %message.submission_id(),
                    wait_ms = wait.as_millis() as u64,
                    "Webhook retry message not yet due, releasing"
                );
                return ConsumerAction::Release(wait.min(self.settings.max_delivery_delay));
            }
            Schedule::Overdue { by } => {
                warn!(
                    submission_id = %message.submission_id(),
                    overdue_ms = by.as_millis() as u64,
                    "Webhook retry message is overdue, delivering now"
                );
            }
            Schedule::Due => {}
        }

        match self.service.retry_webhook(&message).await {
            Ok(_) => ConsumerAction::Ack,
            Err(e) if e.class() == ErrorClass::Infrastructure => ConsumerAction::Retain,
            Err(_) => ConsumerAction::Ack,
        }
    }

    /// Lease one batch, handle the messages concurrently and settle each lease.
    pub async fn poll_once(self: &Arc<Self>) -> Result<PollSummary, QueueError> {
        let messages = self
            .queue
            .receive(self.settings.batch_size, self.settings.visibility_timeout)
            .await?;

        let mut summary = PollSummary {
            received: messages.len(),
            ..PollSummary::default()
        };
        if messages.is_empty() {
            return Ok(summary);
        }

        let mut tasks = JoinSet::new();
        for message in messages {
            let consumer = Arc::clone(self);
            tasks.spawn(async move {
                let action = consumer.handle_message(&message.body).await;
                let action = consumer.cap_redeliveries(&message, action);
                consumer.settle(&message, action).await;
                action
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ConsumerAction::Ack) => summary.acked += 1,
                Ok(ConsumerAction::Release(_)) => summary.released += 1,
                Ok(ConsumerAction::Retain) => summary.retained += 1,
                Err(e) => {
                    error!(error = %e, "Webhook queue handler task failed");
                    summary.retained += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Turn a `Retain` into an `Ack` once the message has used up its receives.
    fn cap_redeliveries(
        &self,
        message: &ReceivedMessage,
        action: ConsumerAction,
    ) -> ConsumerAction {
        if action != ConsumerAction::Retain
            || message.receive_count < self.settings.max_receive_count
        {
            return action;
        }

        counter!("webhook_abandoned_total", "reason" => "max_receive_count").increment(1);
        error!(
            receipt = %message.receipt,
            receive_count = message.receive_count,
            max_receive_count = self.settings.max_receive_count,
            body = %message.body,
            "Dropping webhook queue message that keeps failing"
        );
        ConsumerAction::Ack
    }

    async fn settle(&self, message: &ReceivedMessage, action: ConsumerAction) {
        counter!("webhook_queue_messages_total", "action" => action.label()).increment(1);

        let result = match action {
            ConsumerAction::Ack => self.queue.delete(&message.receipt).await,
            ConsumerAction::Release(delay) => self.queue.release(&message.receipt, delay).await,
            ConsumerAction::Retain => Ok(()),
        };

        if let Err(e) = result {
            warn!(
                receipt = %message.receipt,
                action = action.label(),
                error = %e,
                "Failed to settle webhook queue message"
            );
        }
    }
}
