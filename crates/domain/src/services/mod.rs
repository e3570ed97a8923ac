//! Webhook delivery services.
//!
//! Services contain the delivery logic and depend on external systems only
//! through the traits in [`collaborators`].

pub mod circuit_breaker;
pub mod collaborators;
pub mod dispatcher;
pub mod memory;
pub mod queue_bridge;
pub mod url_validator;
pub mod webhook_service;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use collaborators::{
    AttachmentUrlGenerator, FormConfigStore, HostResolver, QueueDepth, ReceivedMessage,
    SubmissionStore, WebhookHttpResponse, WebhookQueue, WebhookRequest, WebhookTransport,
};
pub use dispatcher::WebhookDispatcher;
pub use queue_bridge::{
    ConsumerAction, ConsumerSettings, PollSummary, WebhookConsumer, WebhookProducer,
};
pub use url_validator::{SystemResolver, UrlValidator, ValidatedUrl};
pub use webhook_service::WebhookService;
