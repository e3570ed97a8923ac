//! In-memory collaborators for tests and local development.
//!
//! Not durable. The queue honours push delays and visibility timeouts using
//! the monotonic clock, so consumer behaviour can be exercised end to end
//! without a database.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use super::collaborators::{
    FormConfigStore, HostResolver, QueueDepth, ReceivedMessage, SubmissionStore, WebhookQueue,
};
use crate::errors::{QueueError, StoreError};
use crate::models::{WebhookConfig, WebhookSubmission};

#[derive(Debug)]
struct QueueEntry {
    id: u64,
    body: String,
    visible_at: Instant,
    receipt: Option<String>,
    receive_count: u32,
}

/// A push accepted by [`InMemoryWebhookQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRecord {
    pub body: String,
    pub delay: Duration,
}

/// Queue kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryWebhookQueue {
    entries: RwLock<Vec<QueueEntry>>,
    pushes: RwLock<Vec<PushRecord>>,
    next_id: AtomicU64,
    fail_pushes: AtomicBool,
}

impl InMemoryWebhookQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent push fail, to simulate an unavailable queue.
    pub fn set_fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    /// Every successful push, in order.
    pub async fn pushes(&self) -> Vec<PushRecord> {
        self.pushes.read().await.clone()
    }

    /// Number of messages still held, visible or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Make every held message visible immediately.
    pub async fn make_all_visible(&self) {
        let now = Instant::now();
        for entry in self.entries.write().await.iter_mut() {
            entry.visible_at = now;
            entry.receipt = None;
        }
    }
}

#[async_trait::async_trait]
impl WebhookQueue for InMemoryWebhookQueue {
    async fn push(&self, body: &str, delay: Duration) -> Result<(), QueueError> {
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("simulated push failure".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.write().await.push(QueueEntry {
            id,
            body: body.to_string(),
            visible_at: Instant::now() + delay,
            receipt: None,
            receive_count: 0,
        });
        self.pushes.write().await.push(PushRecord {
            body: body.to_string(),
            delay,
        });
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut received = Vec::new();

        for entry in entries
            .iter_mut()
            .filter(|e| e.visible_at <= now)
            .take(max_messages)
        {
            let receipt = format!("{}-{}", entry.id, Uuid::new_v4());
            entry.receipt = Some(receipt.clone());
            entry.receive_count += 1;
            entry.visible_at = now + visibility_timeout;
            received.push(ReceivedMessage {
                receipt,
                body: entry.body.clone(),
                receive_count: entry.receive_count,
            });
        }

        Ok(received)
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.receipt.as_deref() != Some(receipt));
        if entries.len() == before {
            return Err(QueueError::UnknownReceipt(receipt.to_string()));
        }
        Ok(())
    }

    async fn release(&self, receipt: &str, delay: Duration) -> Result<(), QueueError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;
        entry.receipt = None;
        entry.visible_at = Instant::now() + delay;
        Ok(())
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(QueueDepth {
            total: entries.len() as u64,
            visible: entries.iter().filter(|e| e.visible_at <= now).count() as u64,
        })
    }
}

/// Submission store backed by a map.
#[derive(Debug, Default)]
pub struct InMemorySubmissionStore {
    submissions: RwLock<HashMap<Uuid, WebhookSubmission>>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, submission: WebhookSubmission) {
        self.submissions
            .write()
            .await
            .insert(submission.submission_id, submission);
    }

    pub async fn remove(&self, submission_id: Uuid) {
        self.submissions.write().await.remove(&submission_id);
    }
}

#[async_trait::async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn get_submission_by_id(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<WebhookSubmission>, StoreError> {
        Ok(self.submissions.read().await.get(&submission_id).cloned())
    }
}

/// Form webhook settings backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryFormConfigStore {
    configs: RwLock<HashMap<Uuid, WebhookConfig>>,
}

impl InMemoryFormConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, form_id: Uuid, config: WebhookConfig) {
        self.configs.write().await.insert(form_id, config);
    }
}

#[async_trait::async_trait]
impl FormConfigStore for InMemoryFormConfigStore {
    async fn get_webhook_config(&self, form_id: Uuid) -> Result<Option<WebhookConfig>, StoreError> {
        Ok(self.configs.read().await.get(&form_id).cloned())
    }
}

/// DNS stub answering from a fixed table. Unknown hosts fail to resolve.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `host` to `addrs`. Entries that are not IP addresses are skipped.
    pub fn with_host(mut self, host: &str, addrs: &[&str]) -> Self {
        let addrs = addrs.iter().filter_map(|a| a.parse().ok()).collect();
        self.hosts.insert(host.to_ascii_lowercase(), addrs);
        self
    }
}

#[async_trait::async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .map(|ips| ips.iter().map(|ip| SocketAddr::new(*ip, port)).collect())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no such host: {host}"),
                )
            })
    }
}
