//! Retry queue message and backoff schedule.
//!
//! A [`WebhookQueueMessage`] is an immutable value: every transition
//! (`increment_attempts`) returns a new message. The JSON wire format is
//!
//! ```json
//! { "submissionId": "...", "previousAttempts": [1700000000000], "nextAttempt": 1700000120000, "_v": 0 }
//! ```

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::WebhookError;

/// Current schema version of the queue message.
pub const QUEUE_MESSAGE_VERSION: u32 = 0;

/// Default number of delivery attempts recorded before giving up.
pub const DEFAULT_MAX_RETRIES: usize = 6;

/// Default tolerance for treating a message as due.
pub const DEFAULT_DUE_TOLERANCE: Duration = Duration::from_secs(5);

/// Exponential backoff schedule with a cap and an attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of recorded attempts before the chain terminates.
    pub max_retries: usize,
    /// Delay before the first retry; doubled for every recorded attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Window either side of `nextAttempt` in which a message is due.
    pub due_tolerance: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            due_tolerance: DEFAULT_DUE_TOLERANCE,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempts` recorded attempts: `min(base * 2^attempts, max)`.
    pub fn delay_for(&self, attempts: usize) -> Duration {
        let exponent = u32::try_from(attempts).unwrap_or(u32::MAX).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    fn delay_ms(&self, attempts: usize) -> i64 {
        // Never schedule at the same millisecond as the attempt itself.
        i64::try_from(self.delay_for(attempts).as_millis())
            .unwrap_or(i64::MAX)
            .max(1)
    }
}

/// Where a message sits relative to its scheduled attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Arrived before the tolerance window opens.
    Early { wait: Duration },
    /// Within the tolerance window.
    Due,
    /// Past the tolerance window.
    Overdue { by: Duration },
}

/// Retry state for one submission's webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookQueueMessage {
    submission_id: Uuid,
    previous_attempts: Vec<i64>,
    next_attempt: i64,
    #[serde(rename = "_v")]
    version: u32,
}

/// Current time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl WebhookQueueMessage {
    pub fn submission_id(&self) -> Uuid {
        self.submission_id
    }

    pub fn previous_attempts(&self) -> &[i64] {
        &self.previous_attempts
    }

    pub fn next_attempt(&self) -> i64 {
        self.next_attempt
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Parse and validate a raw queue body. Never panics.
    pub fn deserialise(raw: &str) -> Result<Self, WebhookError> {
        let message: Self = serde_json::from_str(raw).map_err(|e| WebhookError::parsing(e.to_string()))?;

        if message.version != QUEUE_MESSAGE_VERSION {
            return Err(WebhookError::parsing(format!(
                "unsupported message version {}",
                message.version
            )));
        }

        if message
            .previous_attempts
            .windows(2)
            .any(|pair| pair[1] < pair[0])
        {
            return Err(WebhookError::parsing(
                "previousAttempts must be in chronological order",
            ));
        }

        if let Some(&last) = message.previous_attempts.last() {
            if message.next_attempt <= last {
                return Err(WebhookError::parsing(
                    "nextAttempt must be after the last previous attempt",
                ));
            }
        }

        Ok(message)
    }

    /// Serialise to the JSON wire format.
    pub fn serialise(&self) -> Result<String, WebhookError> {
        serde_json::to_string(self).map_err(|e| WebhookError::unknown(e.to_string()))
    }

    /// Initial message for a submission whose first attempt just failed.
    pub fn from_submission_id(
        submission_id: Uuid,
        policy: &RetryPolicy,
    ) -> Result<Self, WebhookError> {
        Self::from_submission_id_at(submission_id, policy, now_ms())
    }

    pub fn from_submission_id_at(
        submission_id: Uuid,
        policy: &RetryPolicy,
        now: i64,
    ) -> Result<Self, WebhookError> {
        if policy.max_retries == 0 {
            return Err(WebhookError::NoMoreRetries {
                submission_id,
                attempts: 0,
            });
        }

        Ok(Self {
            submission_id,
            previous_attempts: Vec::new(),
            next_attempt: now.saturating_add(policy.delay_ms(0)),
            version: QUEUE_MESSAGE_VERSION,
        })
    }

    /// Record a failed attempt now and schedule the next one.
    pub fn increment_attempts(&self, policy: &RetryPolicy) -> Result<Self, WebhookError> {
        self.increment_attempts_at(policy, now_ms())
    }

    /// Record a failed attempt at `now`.
    ///
    /// Fails with [`WebhookError::NoMoreRetries`] once the history would
    /// reach `max_retries` entries.
    pub fn increment_attempts_at(
        &self,
        policy: &RetryPolicy,
        now: i64,
    ) -> Result<Self, WebhookError> {
        // Clock skew between consumers must not break the ordering invariant.
        let attempted_at = self
            .previous_attempts
            .last()
            .map_or(now, |&last| now.max(last));

        let mut previous_attempts = self.previous_attempts.clone();
        previous_attempts.push(attempted_at);
        let attempts = previous_attempts.len();

        if attempts >= policy.max_retries {
            return Err(WebhookError::NoMoreRetries {
                submission_id: self.submission_id,
                attempts,
            });
        }

        Ok(Self {
            submission_id: self.submission_id,
            previous_attempts,
            next_attempt: attempted_at.saturating_add(policy.delay_ms(attempts)),
            version: self.version,
        })
    }

    /// Classify `now` against `nextAttempt` with the given tolerance.
    pub fn schedule_at(&self, now: i64, tolerance: Duration) -> Schedule {
        let tolerance_ms = i64::try_from(tolerance.as_millis()).unwrap_or(i64::MAX);
        let diff = now.saturating_sub(self.next_attempt);

        if diff < -tolerance_ms {
            Schedule::Early {
                wait: Duration::from_millis(diff.unsigned_abs()),
            }
        } else if diff > tolerance_ms {
            Schedule::Overdue {
                by: Duration::from_millis(diff.unsigned_abs()),
            }
        } else {
            Schedule::Due
        }
    }

    /// True when `now` is within `tolerance` of `nextAttempt`, on either side.
    pub fn is_due_at(&self, now: i64, tolerance: Duration) -> bool {
        self.schedule_at(now, tolerance) == Schedule::Due
    }

    pub fn is_due(&self, tolerance: Duration) -> bool {
        self.is_due_at(now_ms(), tolerance)
    }
}
