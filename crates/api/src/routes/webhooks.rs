//! Internal webhook trigger endpoint.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub submission_id: Uuid,
    pub status: &'static str,
}

/// Start delivery for a newly accepted submission.
///
/// POST /internal/v1/submissions/:submission_id/webhook
///
/// Replies 202 immediately. Delivery runs on the state's task tracker, which
/// shutdown drains; the outcome is only visible in logs and metrics.
pub async fn trigger_webhook(
    State(state): State<AppState>,
    Path(submission_id): Path<Uuid>,
) -> (StatusCode, Json<TriggerResponse>) {
    info!(submission_id = %submission_id, "Webhook delivery requested");

    let service = state.service.clone();
    state.tasks.spawn(async move {
        match service.send_webhook(submission_id).await {
            Ok(outcome) => {
                debug!(submission_id = %submission_id, outcome = %outcome, "Webhook trigger finished")
            }
            Err(e) => {
                debug!(submission_id = %submission_id, error = %e, "Webhook trigger finished with error")
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            submission_id,
            status: "accepted",
        }),
    )
}
