use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use domain::models::RetryPolicy;
use domain::services::{CircuitBreakerConfig, ConsumerSettings};
pub use persistence::db::DatabaseConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub attachments: AttachmentsConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Outbound webhook request settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Base64-encoded 32-byte Ed25519 seed used to sign webhooks.
    #[serde(default)]
    pub signing_key: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Longest receiver response body read, in bytes.
    #[serde(default = "default_max_response_body_bytes")]
    pub max_response_body_bytes: usize,
}

/// Retry schedule for failed deliveries.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Window either side of a message's scheduled time in which it is due.
    #[serde(default = "default_due_tolerance_secs")]
    pub due_tolerance_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            due_tolerance_secs: default_due_tolerance_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            due_tolerance: Duration::from_secs(self.due_tolerance_secs),
        }
    }
}

/// Retry queue consumer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    #[serde(default = "default_max_delivery_delay_secs")]
    pub max_delivery_delay_secs: u64,

    /// Receives after which a message that keeps failing on infrastructure
    /// errors is dropped.
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_delivery_delay_secs: default_max_delivery_delay_secs(),
            max_receive_count: default_max_receive_count(),
        }
    }
}

impl QueueConfig {
    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            batch_size: self.batch_size,
            visibility_timeout: Duration::from_secs(self.visibility_timeout_secs),
            max_delivery_delay: self.max_delivery_delay(),
            max_receive_count: self.max_receive_count,
        }
    }

    pub fn max_delivery_delay(&self) -> Duration {
        Duration::from_secs(self.max_delivery_delay_secs)
    }
}

/// Signed attachment download links.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentsConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub signing_secret: String,

    #[serde(default = "default_url_expiry_secs")]
    pub url_expiry_secs: u64,
}

/// Per-host breaker for webhook receivers.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_cb_window_size")]
    pub window_size: usize,

    #[serde(default = "default_cb_min_requests")]
    pub min_requests: usize,

    #[serde(default = "default_cb_failure_rate")]
    pub failure_rate_threshold: f64,

    #[serde(default = "default_cb_open_secs")]
    pub open_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            window_size: default_cb_window_size(),
            min_requests: default_cb_min_requests(),
            failure_rate_threshold: default_cb_failure_rate(),
            open_secs: default_cb_open_secs(),
        }
    }
}

impl CircuitBreakerSettings {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            window_size: self.window_size,
            min_requests: self.min_requests,
            failure_rate_threshold: self.failure_rate_threshold,
            open_duration: Duration::from_secs(self.open_secs),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_webhook_timeout_ms() -> u64 {
    10_000
}
fn default_user_agent() -> String {
    concat!("form-webhooks/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_max_response_body_bytes() -> usize {
    64 * 1024
}
fn default_max_retries() -> usize {
    6
}
fn default_base_delay_secs() -> u64 {
    60
}
fn default_max_delay_secs() -> u64 {
    3600
}
fn default_due_tolerance_secs() -> u64 {
    5
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_batch_size() -> usize {
    10
}
fn default_visibility_timeout_secs() -> u64 {
    120
}
fn default_max_delivery_delay_secs() -> u64 {
    900
}
fn default_max_receive_count() -> u32 {
    10
}
fn default_url_expiry_secs() -> u64 {
    3600
}
fn default_cb_window_size() -> usize {
    20
}
fn default_cb_min_requests() -> usize {
    5
}
fn default_cb_failure_rate() -> f64 {
    0.5
}
fn default_cb_open_secs() -> u64 {
    60
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with FW__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("FW").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds entirely from embedded defaults and overrides, without config
    /// files. Validation is skipped to allow partial configs.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [webhook]
            request_timeout_ms = 10000
            signing_key = "BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc="

            [retry]
            max_retries = 6
            base_delay_secs = 60
            max_delay_secs = 3600
            due_tolerance_secs = 5

            [queue]
            poll_interval_secs = 5
            batch_size = 10
            visibility_timeout_secs = 120
            max_delivery_delay_secs = 900
            max_receive_count = 10

            [attachments]
            base_url = "https://files.example.com"
            signing_secret = "test-attachment-secret"
            url_expiry_secs = 3600

            [circuit_breaker]
            enabled = false
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "FW__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.webhook.signing_key.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "FW__WEBHOOK__SIGNING_KEY environment variable must be set".to_string(),
            ));
        }
        shared::crypto::WebhookSigner::from_base64(&self.webhook.signing_key)
            .map_err(|e| ConfigValidationError::InvalidValue(format!("webhook.signing_key: {e}")))?;

        if self.retry.max_retries == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "retry.max_retries must be at least 1".to_string(),
            ));
        }

        if self.retry.base_delay_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "retry.base_delay_secs must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_delay_secs < self.retry.base_delay_secs {
            return Err(ConfigValidationError::InvalidValue(
                "retry.max_delay_secs cannot be less than retry.base_delay_secs".to_string(),
            ));
        }

        if self.queue.batch_size == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "queue.batch_size must be at least 1".to_string(),
            ));
        }

        if self.queue.max_receive_count == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "queue.max_receive_count must be at least 1".to_string(),
            ));
        }

        // A lease must outlive one attempt or a second consumer can pick the
        // message up mid-dispatch.
        let lease_ms = self.queue.visibility_timeout_secs.saturating_mul(1000);
        if lease_ms <= self.webhook.request_timeout_ms {
            return Err(ConfigValidationError::InvalidValue(
                "queue.visibility_timeout_secs must exceed webhook.request_timeout_ms".to_string(),
            ));
        }

        let rate = self.circuit_breaker.failure_rate_threshold;
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(ConfigValidationError::InvalidValue(
                "circuit_breaker.failure_rate_threshold must be in (0, 1]".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
