//! Error types for webhook delivery.
//!
//! [`WebhookError`] is the single error type flowing through the delivery
//! pipeline. Callers branch on [`WebhookError::class`] to decide whether a
//! failure schedules a retry, ends the chain, or is an infrastructure fault.
//! The narrower error types below are returned by collaborator traits and
//! mapped into [`WebhookError`] where they are consumed.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Errors produced while delivering a submission webhook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// URL failed to parse, is not HTTPS, or resolves to a non-public address.
    #[error("webhook URL rejected: {reason}")]
    Validation { url: String, reason: String },

    /// Attachment download links could not be generated.
    #[error("failed to generate presigned attachment URLs: {message}")]
    PresignedUrlGeneration { message: String },

    /// Receiver answered with a non-2xx status, or the request failed in transit.
    #[error("webhook request failed: {message}")]
    Http {
        status: Option<u16>,
        message: String,
    },

    /// Any other failure during an attempt (signing, serialisation, client setup).
    #[error("webhook failed with unexpected error: {message}")]
    Unknown { message: String },

    /// The per-host circuit breaker is open for the receiver.
    #[error("circuit breaker open for host {host}")]
    CircuitOpen { host: String },

    /// The form has a webhook but retries are switched off.
    #[error("webhook retries are not enabled for form {form_id}")]
    RetriesNotEnabled { form_id: Uuid },

    /// The form has no webhook URL configured.
    #[error("no webhook URL configured for form {form_id}")]
    NotConfigured { form_id: Uuid },

    /// The submission no longer exists.
    #[error("submission {submission_id} not found")]
    SubmissionNotFound { submission_id: Uuid },

    /// A queue message body could not be parsed or failed shape validation.
    #[error("invalid webhook queue message: {message}")]
    QueueMessageParsing { message: String },

    /// A stored submission or form could not be decoded.
    #[error("stored record is malformed: {message}")]
    MalformedRecord { message: String },

    /// The retry budget for the submission is spent.
    #[error("no more retries for submission {submission_id} after {attempts} attempts")]
    NoMoreRetries { submission_id: Uuid, attempts: usize },

    /// The retry message could not be written to the queue.
    #[error("failed to push webhook message to queue: {message}")]
    PushToQueue { message: String },

    /// A collaborator store (submissions, forms) was unavailable.
    #[error("store unavailable: {message}")]
    Store { message: String },
}

/// How the pipeline reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Logged and dropped; no retry message is produced.
    NonRetryable,
    /// Logged; a new or incremented retry message is enqueued.
    Retryable,
    /// Retry budget spent; permanent delivery failure.
    Exhausted,
    /// Queue or store fault outside the delivery attempt itself.
    Infrastructure,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonRetryable => write!(f, "non_retryable"),
            Self::Retryable => write!(f, "retryable"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

impl WebhookError {
    pub fn validation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn http(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        Self::QueueMessageParsing {
            message: message.into(),
        }
    }

    pub fn push_to_queue(message: impl Into<String>) -> Self {
        Self::PushToQueue {
            message: message.into(),
        }
    }

    /// Classify the error for retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Http { .. } | Self::Unknown { .. } | Self::CircuitOpen { .. } => {
                ErrorClass::Retryable
            }

            Self::Validation { .. }
            | Self::PresignedUrlGeneration { .. }
            | Self::RetriesNotEnabled { .. }
            | Self::NotConfigured { .. }
            | Self::SubmissionNotFound { .. }
            | Self::QueueMessageParsing { .. }
            | Self::MalformedRecord { .. } => ErrorClass::NonRetryable,

            Self::NoMoreRetries { .. } => ErrorClass::Exhausted,

            Self::PushToQueue { .. } | Self::Store { .. } => ErrorClass::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::PresignedUrlGeneration { .. } => "presigned_url_generation",
            Self::Http { .. } => "http",
            Self::Unknown { .. } => "unknown",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::RetriesNotEnabled { .. } => "retries_not_enabled",
            Self::NotConfigured { .. } => "not_configured",
            Self::SubmissionNotFound { .. } => "submission_not_found",
            Self::QueueMessageParsing { .. } => "queue_message_parsing",
            Self::MalformedRecord { .. } => "malformed_record",
            Self::NoMoreRetries { .. } => "no_more_retries",
            Self::PushToQueue { .. } => "push_to_queue",
            Self::Store { .. } => "store",
        }
    }
}

/// Failure reading from a submission or form store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached or the query failed.
    #[error("{0}")]
    Unavailable(String),

    /// A stored record exists but cannot be converted; rereading won't help.
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl From<StoreError> for WebhookError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => Self::Store { message },
            StoreError::Malformed(message) => Self::MalformedRecord { message },
        }
    }
}

/// Failure generating attachment download links.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AttachmentUrlError(pub String);

impl From<AttachmentUrlError> for WebhookError {
    fn from(err: AttachmentUrlError) -> Self {
        Self::PresignedUrlGeneration { message: err.0 }
    }
}

/// Failure talking to the retry queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("unknown receipt handle {0}")]
    UnknownReceipt(String),
}

/// Failure of the outbound HTTPS request itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for WebhookError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { .. } | TransportError::Connection(_) => {
                Self::http(None, err.to_string())
            }
            TransportError::Other(message) => Self::Unknown { message },
        }
    }
}
