//! Integration tests for first-attempt webhook delivery.

mod common;

use std::sync::Arc;

use common::{
    fast_policy, FailingAttachments, Harness, ScriptedTransport, INTERNAL_HOST, TEST_SEED,
    WEBHOOK_URL,
};
use domain::errors::{ErrorClass, TransportError};
use domain::models::DeliveryState;
use domain::WebhookError;
use shared::crypto::{verify_signature_header, WebhookSigner};

#[tokio::test]
async fn test_delivery_sends_signed_payload() {
    let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;

    let state = harness.service.send_webhook(id).await.unwrap();
    assert_eq!(state, DeliveryState::Delivered { status: 200 });

    let requests = harness.transport.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    // Pinned to the address the validator resolved.
    assert_eq!(
        request.resolved_addrs,
        vec!["93.184.216.34:443".parse::<std::net::SocketAddr>().unwrap()]
    );

    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["data"]["submissionId"], id.to_string());
    assert_eq!(body["data"]["responses"][0]["answer"], "Ada");
    assert!(body["data"].get("attachmentDownloadUrls").is_none());

    let public_key = WebhookSigner::from_seed(&TEST_SEED).public_key_base64();
    let header = verify_signature_header(
        &public_key,
        &request.signature,
        WEBHOOK_URL,
        request.body.as_bytes(),
    )
    .unwrap();
    assert_eq!(header.submission_id, id.to_string());
    assert_eq!(header.form_id, body["data"]["formId"].as_str().unwrap());
}

#[tokio::test]
async fn test_signature_verifies_against_url_as_configured() {
    let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));
    let id = harness.seed("https://hooks.example.com", true, &[]).await;

    harness.service.send_webhook(id).await.unwrap();

    let request = &harness.transport.requests()[0];
    let public_key = WebhookSigner::from_seed(&TEST_SEED).public_key_base64();
    let header = verify_signature_header(
        &public_key,
        &request.signature,
        "https://hooks.example.com",
        request.body.as_bytes(),
    )
    .unwrap();
    assert_eq!(header.submission_id, id.to_string());
}

#[tokio::test]
async fn test_delivery_includes_signed_attachment_links() {
    let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));
    let id = harness
        .seed(WEBHOOK_URL, true, &["forms/a/cv.pdf", "forms/a/photo.png"])
        .await;

    harness.service.send_webhook(id).await.unwrap();

    let request = &harness.transport.requests()[0];
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    let urls = &body["data"]["attachmentDownloadUrls"];
    assert!(urls["field-0"]
        .as_str()
        .unwrap()
        .starts_with("https://files.example.com/download/forms/a/cv.pdf?expires="));
    assert!(urls["field-1"].as_str().unwrap().contains("signature="));
}

#[tokio::test]
async fn test_presign_failure_is_not_retried_and_sends_nothing() {
    let harness = Harness::with_attachments(
        ScriptedTransport::default(),
        fast_policy(6),
        Arc::new(FailingAttachments),
    );
    let id = harness.seed(WEBHOOK_URL, true, &["forms/a/cv.pdf"]).await;

    let err = harness.service.send_webhook(id).await.unwrap_err();

    assert!(matches!(err, WebhookError::PresignedUrlGeneration { .. }));
    assert_eq!(err.class(), ErrorClass::NonRetryable);
    assert_eq!(harness.transport.calls(), 0);
    assert!(harness.queue.pushes().await.is_empty());
}

#[tokio::test]
async fn test_private_network_targets_are_rejected() {
    let targets = [
        format!("https://{INTERNAL_HOST}/hook"),
        "https://127.0.0.1/hook".to_string(),
        "https://169.254.169.254/latest/meta-data".to_string(),
        "https://[::1]/hook".to_string(),
        "https://unknown.example.com/hook".to_string(),
    ];

    for target in targets {
        let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));
        let id = harness.seed(&target, true, &[]).await;

        let err = harness.service.send_webhook(id).await.unwrap_err();

        assert!(
            matches!(err, WebhookError::Validation { .. }),
            "{target} should fail validation, got {err:?}"
        );
        assert_eq!(harness.transport.calls(), 0, "{target} reached the transport");
        assert!(harness.queue.pushes().await.is_empty());
    }
}

#[tokio::test]
async fn test_plain_http_url_is_rejected() {
    let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));
    let id = harness
        .seed("http://hooks.example.com/forms/receive", true, &[])
        .await;

    let err = harness.service.send_webhook(id).await.unwrap_err();

    assert!(matches!(err, WebhookError::Validation { .. }));
    assert_eq!(harness.transport.calls(), 0);
}

#[tokio::test]
async fn test_retries_disabled_sends_nothing() {
    let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, false, &[]).await;

    let err = harness.service.send_webhook(id).await.unwrap_err();

    assert!(matches!(err, WebhookError::RetriesNotEnabled { .. }));
    assert_eq!(harness.transport.calls(), 0);
    assert!(harness.queue.pushes().await.is_empty());
}

#[tokio::test]
async fn test_missing_webhook_url_is_not_configured() {
    let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));
    let id = harness.seed("   ", true, &[]).await;

    let err = harness.service.send_webhook(id).await.unwrap_err();

    assert!(matches!(err, WebhookError::NotConfigured { .. }));
    assert_eq!(harness.transport.calls(), 0);
}

#[tokio::test]
async fn test_unknown_submission_is_reported() {
    let harness = Harness::new(ScriptedTransport::default(), fast_policy(6));

    let err = harness
        .service
        .send_webhook(uuid::Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::SubmissionNotFound { .. }));
}

#[tokio::test]
async fn test_non_2xx_and_transport_failures_schedule_a_retry() {
    let harness = Harness::new(
        ScriptedTransport::new(vec![
            Ok(common::response(404)),
            Err(TransportError::Timeout { timeout_ms: 2000 }),
            Err(TransportError::Connection("connection reset".to_string())),
        ]),
        fast_policy(6),
    );

    for _ in 0..3 {
        let id = harness.seed(WEBHOOK_URL, true, &[]).await;
        let state = harness.service.send_webhook(id).await.unwrap();
        assert!(matches!(state, DeliveryState::RetryScheduled { .. }));
    }

    assert_eq!(harness.transport.calls(), 3);
    assert_eq!(harness.pushed_messages().await.len(), 3);
}

#[tokio::test]
async fn test_first_retry_is_scheduled_one_base_delay_out() {
    let harness = Harness::new(ScriptedTransport::statuses(&[500]), fast_policy(6));
    let id = harness.seed(WEBHOOK_URL, true, &[]).await;

    let before = domain::models::queue_message::now_ms();
    let state = harness.service.send_webhook(id).await.unwrap();
    let after = domain::models::queue_message::now_ms();

    let DeliveryState::RetryScheduled { next_attempt } = state else {
        panic!("expected a scheduled retry, got {state:?}");
    };
    assert!(next_attempt > before && next_attempt <= after + 1);

    let pushes = harness.queue.pushes().await;
    assert_eq!(pushes.len(), 1);
    assert!(pushes[0].delay <= std::time::Duration::from_millis(1));
}
