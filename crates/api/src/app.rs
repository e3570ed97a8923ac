use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tokio_util::task::TaskTracker;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use domain::services::{
    CircuitBreaker, SystemResolver, UrlValidator, WebhookConsumer, WebhookDispatcher,
    WebhookProducer, WebhookQueue, WebhookService,
};
use persistence::repositories::{
    FormWebhookRepository, SubmissionRepository, WebhookQueueRepository,
};
use shared::crypto::{CryptoError, WebhookSigner};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{health, webhooks};
use crate::services::{ReqwestTransport, SignedAttachmentUrlGenerator};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub service: Arc<WebhookService>,
    pub queue: Arc<dyn WebhookQueue>,
    /// First attempts started by the trigger endpoint.
    pub tasks: TaskTracker,
}

/// Delivery components shared by the HTTP surface and the background jobs.
#[derive(Clone)]
pub struct Delivery {
    pub service: Arc<WebhookService>,
    pub consumer: Arc<WebhookConsumer>,
    pub queue: Arc<dyn WebhookQueue>,
    pub tasks: TaskTracker,
}

impl Delivery {
    /// Wire delivery from its collaborators.
    pub fn new(config: &Config, queue: Arc<dyn WebhookQueue>, service: Arc<WebhookService>) -> Self {
        let consumer = Arc::new(WebhookConsumer::new(
            Arc::clone(&queue),
            Arc::clone(&service),
            config.queue.consumer_settings(),
        ));
        Self {
            service,
            consumer,
            queue,
            tasks: TaskTracker::new(),
        }
    }

    /// Wait for in-flight trigger deliveries after the server stops.
    ///
    /// Returns `false` if some were still running when `timeout` elapsed.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }

    /// Production wiring on top of PostgreSQL and the system resolver.
    pub fn from_config(config: &Config, pool: &PgPool) -> Result<Self, CryptoError> {
        let signer = WebhookSigner::from_base64(&config.webhook.signing_key)?;

        let mut dispatcher = WebhookDispatcher::new(
            UrlValidator::new(Arc::new(SystemResolver)),
            Arc::new(SignedAttachmentUrlGenerator::new(&config.attachments)),
            Arc::new(ReqwestTransport::new(&config.webhook)),
            signer,
        );
        if config.circuit_breaker.enabled {
            dispatcher = dispatcher.with_circuit_breaker(Arc::new(CircuitBreaker::new(
                config.circuit_breaker.breaker_config(),
            )));
        }

        let queue: Arc<dyn WebhookQueue> = Arc::new(WebhookQueueRepository::new(pool.clone()));
        let producer = WebhookProducer::new(Arc::clone(&queue), config.queue.max_delivery_delay());

        let service = Arc::new(WebhookService::new(
            Arc::new(SubmissionRepository::new(pool.clone())),
            Arc::new(FormWebhookRepository::new(pool.clone())),
            Arc::new(dispatcher),
            producer,
            config.retry.policy(),
        ));

        Ok(Self::new(config, queue, service))
    }
}

impl AppState {
    pub fn new(pool: PgPool, delivery: &Delivery) -> Self {
        Self {
            pool,
            service: Arc::clone(&delivery.service),
            queue: Arc::clone(&delivery.queue),
            tasks: delivery.tasks.clone(),
        }
    }
}

pub fn create_app(config: &Config, state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let internal_routes = Router::new().route(
        "/internal/v1/submissions/:submission_id/webhook",
        post(webhooks::trigger_webhook),
    );

    Router::new()
        .merge(public_routes)
        .merge(internal_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .with_state(state)
}
