//! Integration tests for queued webhook retries.
//!
//! Covers the full loop: first attempt, queue message, consumer poll,
//! redelivery, and how the consumer settles each message.

mod common;

use std::time::Duration;

use common::{fast_policy, Harness, ScriptedTransport, WEBHOOK_URL};
use domain::errors::ErrorClass;
use domain::models::{DeliveryState, RetryPolicy, WebhookConfig, WebhookQueueMessage};
use domain::services::{SubmissionStore, WebhookQueue};
use domain::WebhookError;

#[tokio::test]
async fn test_fail_fail_succeed_is_delivered_on_second_retry() {
    let harness = Harness::new(ScriptedTransport::statuses(&[500, 503]), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;

    let state = harness.service.send_webhook(id).await.unwrap();
    assert!(matches!(state, DeliveryState::RetryScheduled { .. }));
    assert_eq!(harness.transport.calls(), 1);

    let first = harness.poll_after_delay().await;
    assert_eq!(first.received, 1);
    assert_eq!(first.acked, 1);
    assert_eq!(harness.transport.calls(), 2);

    let second = harness.poll_after_delay().await;
    assert_eq!(second.received, 1);
    assert_eq!(second.acked, 1);
    assert_eq!(harness.transport.calls(), 3);

    // Two failures produced two queue messages; the success produced none.
    let messages = harness.pushed_messages().await;
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.submission_id() == id));
    assert!(messages[0].previous_attempts().is_empty());
    assert_eq!(messages[1].previous_attempts().len(), 1);
    assert!(messages[1].next_attempt() > messages[0].next_attempt());
    assert!(harness.queue.is_empty().await);
}

#[tokio::test]
async fn test_retries_stop_after_max_retries() {
    let harness = Harness::new(ScriptedTransport::statuses(&[500; 10]), fast_policy(2));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;

    harness.service.send_webhook(id).await.unwrap();
    harness.poll_after_delay().await;
    let last = harness.poll_after_delay().await;

    assert_eq!(last.acked, 1);
    assert_eq!(harness.transport.calls(), 3);
    assert_eq!(harness.pushed_messages().await.len(), 2);
    assert!(harness.queue.is_empty().await);

    // Nothing left to deliver.
    let idle = harness.poll_after_delay().await;
    assert_eq!(idle.received, 0);
    assert_eq!(harness.transport.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retry_reports_no_more_retries() {
    let policy = fast_policy(1);
    let harness = Harness::new(ScriptedTransport::statuses(&[500, 500]), policy);
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;

    let message = WebhookQueueMessage::from_submission_id(id, &policy).unwrap();
    let err = harness.service.retry_webhook(&message).await.unwrap_err();

    assert!(matches!(
        err,
        WebhookError::NoMoreRetries { attempts: 1, .. }
    ));
    assert_eq!(err.class(), ErrorClass::Exhausted);
    assert!(harness.queue.pushes().await.is_empty());
}

#[tokio::test]
async fn test_push_failure_on_first_attempt_is_abandoned_not_error() {
    let harness = Harness::new(ScriptedTransport::statuses(&[502]), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;
    harness.queue.set_fail_pushes(true);

    let state = harness.service.send_webhook(id).await.unwrap();

    assert_eq!(state, DeliveryState::Abandoned);
    assert_eq!(harness.transport.calls(), 1);
    assert!(harness.queue.is_empty().await);
}

#[tokio::test]
async fn test_push_failure_during_retry_keeps_message_for_redelivery() {
    let harness = Harness::new(ScriptedTransport::statuses(&[500, 500]), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;
    harness.service.send_webhook(id).await.unwrap();

    harness.queue.set_fail_pushes(true);
    let summary = harness.poll_after_delay().await;
    assert_eq!(summary.retained, 1);
    assert_eq!(harness.queue.len().await, 1);

    // Once the queue recovers the retained message is delivered.
    harness.queue.set_fail_pushes(false);
    harness.queue.make_all_visible().await;
    let summary = harness.consumer.poll_once().await.unwrap();
    assert_eq!(summary.acked, 1);
    assert_eq!(harness.transport.calls(), 3);
    assert!(harness.queue.is_empty().await);
}

#[tokio::test]
async fn test_lasting_push_failure_stops_after_max_receives() {
    let harness = Harness::new(ScriptedTransport::statuses(&[500; 10]), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;
    harness.service.send_webhook(id).await.unwrap();
    harness.queue.set_fail_pushes(true);

    let first = harness.poll_after_delay().await;
    assert_eq!(first.retained, 1);
    harness.queue.make_all_visible().await;
    let second = harness.consumer.poll_once().await.unwrap();
    assert_eq!(second.retained, 1);
    harness.queue.make_all_visible().await;

    // The harness allows three receives; the third settles the message.
    let third = harness.consumer.poll_once().await.unwrap();
    assert_eq!(third.acked, 1);
    assert!(harness.queue.is_empty().await);

    harness.queue.make_all_visible().await;
    assert_eq!(harness.consumer.poll_once().await.unwrap().received, 0);
    assert_eq!(harness.transport.calls(), 4);
}

#[tokio::test]
async fn test_unparseable_message_is_dropped() {
    let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));
    harness
        .queue
        .push("{\"submissionId\":\"not-a-uuid\"}", Duration::ZERO)
        .await
        .unwrap();
    harness.queue.push("not json", Duration::ZERO).await.unwrap();

    let summary = harness.consumer.poll_once().await.unwrap();

    assert_eq!(summary.received, 2);
    assert_eq!(summary.acked, 2);
    assert_eq!(harness.transport.calls(), 0);
    assert!(harness.queue.is_empty().await);
}

#[tokio::test]
async fn test_early_message_is_released_without_delivery() {
    let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;

    // Scheduled a minute out but made visible immediately.
    let message = WebhookQueueMessage::from_submission_id(id, &RetryPolicy::default()).unwrap();
    harness
        .queue
        .push(&message.serialise().unwrap(), Duration::ZERO)
        .await
        .unwrap();

    let summary = harness.consumer.poll_once().await.unwrap();

    assert_eq!(summary.released, 1);
    assert_eq!(harness.transport.calls(), 0);
    let depth = harness.queue.depth().await.unwrap();
    assert_eq!(depth.total, 1);
    assert_eq!(depth.visible, 0);
}

#[tokio::test]
async fn test_overdue_message_is_still_delivered() {
    let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;

    let long_ago = domain::models::queue_message::now_ms() - 3_600_000;
    let message =
        WebhookQueueMessage::from_submission_id_at(id, &fast_policy(6), long_ago).unwrap();
    harness
        .queue
        .push(&message.serialise().unwrap(), Duration::ZERO)
        .await
        .unwrap();

    let summary = harness.consumer.poll_once().await.unwrap();

    assert_eq!(summary.acked, 1);
    assert_eq!(harness.transport.calls(), 1);
}

#[tokio::test]
async fn test_retry_rereads_form_settings() {
    let harness = Harness::new(ScriptedTransport::statuses(&[500]), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;
    harness.service.send_webhook(id).await.unwrap();

    // The form owner switches retries off before the retry runs.
    let submission = harness
        .submissions
        .get_submission_by_id(id)
        .await
        .unwrap()
        .unwrap();
    harness
        .forms
        .set(
            submission.form_id,
            WebhookConfig {
                url: Some(WEBHOOK_URL.to_string()),
                retries_enabled: false,
            },
        )
        .await;

    let summary = harness.poll_after_delay().await;

    assert_eq!(summary.acked, 1);
    assert_eq!(harness.transport.calls(), 1);
    assert_eq!(harness.pushed_messages().await.len(), 1);
}

#[tokio::test]
async fn test_deleted_submission_is_not_retried() {
    let harness = Harness::new(ScriptedTransport::statuses(&[500]), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;
    harness.service.send_webhook(id).await.unwrap();

    harness.submissions.remove(id).await;
    let summary = harness.poll_after_delay().await;

    assert_eq!(summary.acked, 1);
    assert_eq!(harness.transport.calls(), 1);
    assert!(harness.queue.is_empty().await);
}
