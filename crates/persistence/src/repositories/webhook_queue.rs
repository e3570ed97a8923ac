//! PostgreSQL-backed webhook retry queue.
//!
//! Messages are rows with a `visible_at` timestamp. Receiving leases rows
//! with `FOR UPDATE SKIP LOCKED`, assigns each a fresh receipt and pushes
//! `visible_at` forward by the visibility timeout, so concurrent consumers
//! never lease the same row and unsettled leases expire on their own.

use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::errors::QueueError;
use domain::services::{QueueDepth, ReceivedMessage, WebhookQueue};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::WebhookQueueEntity;
use crate::metrics::QueryTimer;

/// Repository for the webhook_queue table.
#[derive(Clone)]
pub struct WebhookQueueRepository {
    pool: PgPool,
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn unavailable(e: sqlx::Error) -> QueueError {
    QueueError::Unavailable(e.to_string())
}

impl WebhookQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_receipt(receipt: &str) -> Result<Uuid, QueueError> {
        Uuid::parse_str(receipt).map_err(|_| QueueError::UnknownReceipt(receipt.to_string()))
    }
}

#[async_trait::async_trait]
impl WebhookQueue for WebhookQueueRepository {
    async fn push(&self, body: &str, delay: Duration) -> Result<(), QueueError> {
        let timer = QueryTimer::new("webhook_queue_push");
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_queue (body, visible_at)
            VALUES ($1, $2)
            "#,
        )
        .bind(body)
        .bind(after(Utc::now(), delay))
        .execute(&self.pool)
        .await;
        timer.record();

        result.map(|_| ()).map_err(unavailable)
    }

    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let now = Utc::now();
        let limit = i64::try_from(max_messages).unwrap_or(i64::MAX);

        let timer = QueryTimer::new("webhook_queue_receive");
        let result = sqlx::query_as::<_, WebhookQueueEntity>(
            r#"
            WITH leased AS (
                SELECT id
                FROM webhook_queue
                WHERE visible_at <= $1
                ORDER BY visible_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE webhook_queue q
            SET receipt = gen_random_uuid(),
                receive_count = q.receive_count + 1,
                visible_at = $3
            FROM leased
            WHERE q.id = leased.id
            RETURNING q.id, q.body, q.receipt, q.receive_count
            "#,
        )
        .bind(now)
        .bind(limit)
        .bind(after(now, visibility_timeout))
        .fetch_all(&self.pool)
        .await;
        timer.record();

        let rows = result.map_err(unavailable)?;
        Ok(rows.into_iter().map(ReceivedMessage::from).collect())
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        let receipt_id = Self::parse_receipt(receipt)?;

        let timer = QueryTimer::new("webhook_queue_delete");
        let result = sqlx::query(r#"DELETE FROM webhook_queue WHERE receipt = $1"#)
            .bind(receipt_id)
            .execute(&self.pool)
            .await;
        timer.record();

        match result.map_err(unavailable)?.rows_affected() {
            0 => Err(QueueError::UnknownReceipt(receipt.to_string())),
            _ => Ok(()),
        }
    }

    async fn release(&self, receipt: &str, delay: Duration) -> Result<(), QueueError> {
        let receipt_id = Self::parse_receipt(receipt)?;

        let timer = QueryTimer::new("webhook_queue_release");
        let result = sqlx::query(
            r#"
            UPDATE webhook_queue
            SET receipt = NULL, visible_at = $2
            WHERE receipt = $1
            "#,
        )
        .bind(receipt_id)
        .bind(after(Utc::now(), delay))
        .execute(&self.pool)
        .await;
        timer.record();

        match result.map_err(unavailable)?.rows_affected() {
            0 => Err(QueueError::UnknownReceipt(receipt.to_string())),
            _ => Ok(()),
        }
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let timer = QueryTimer::new("webhook_queue_depth");
        let result: Result<(i64, i64), sqlx::Error> = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE visible_at <= NOW())
            FROM webhook_queue
            "#,
        )
        .fetch_one(&self.pool)
        .await;
        timer.record();

        let (total, visible) = result.map_err(unavailable)?;
        Ok(QueueDepth {
            total: total.max(0) as u64,
            visible: visible.max(0) as u64,
        })
    }
}
