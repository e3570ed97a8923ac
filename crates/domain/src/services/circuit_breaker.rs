//! Per-host circuit breaker for webhook receivers.
//!
//! Tracks a rolling window of attempt outcomes per host. When the failure
//! rate over the window reaches the threshold the circuit opens and attempts
//! to that host fail fast with [`WebhookError::CircuitOpen`] until the open
//! period elapses. One probe is then let through (half-open); its outcome
//! closes or re-opens the circuit.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::WebhookError;

/// Breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of most recent outcomes considered.
    pub window_size: usize,
    /// Minimum outcomes in the window before the breaker may open.
    pub min_requests: usize,
    /// Failure rate in `(0, 1]` at which the breaker opens.
    pub failure_rate_threshold: f64,
    /// Time to stay open before allowing a probe.
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            min_requests: 5,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct HostCircuit {
    outcomes: VecDeque<bool>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl HostCircuit {
    fn new(capacity: usize) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            opened_at: None,
            probe_in_flight: false,
        }
    }

    fn state(&self, open_duration: Duration) -> CircuitState {
        match self.opened_at {
            None => CircuitState::Closed,
            Some(opened) if opened.elapsed() >= open_duration => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.outcomes.len() as f64
    }
}

/// Rolling-window circuit breaker keyed by receiver host.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    hosts: Mutex<HashMap<String, HostCircuit>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject an attempt to `host`.
    pub async fn check(&self, host: &str) -> Result<(), WebhookError> {
        let mut hosts = self.hosts.lock().await;
        let Some(circuit) = hosts.get_mut(host) else {
            return Ok(());
        };

        match circuit.state(self.config.open_duration) {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen if !circuit.probe_in_flight => {
                debug!(host = %host, "Circuit breaker half-open, allowing probe");
                circuit.probe_in_flight = true;
                Ok(())
            }
            CircuitState::HalfOpen | CircuitState::Open => Err(WebhookError::CircuitOpen {
                host: host.to_string(),
            }),
        }
    }

    pub async fn record_success(&self, host: &str) {
        let mut hosts = self.hosts.lock().await;
        let circuit = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostCircuit::new(self.config.window_size));

        if circuit.opened_at.is_some() {
            info!(host = %host, "Circuit breaker closed after successful probe");
            circuit.opened_at = None;
            circuit.probe_in_flight = false;
            circuit.outcomes.clear();
        }
        self.push_outcome(circuit, true);
    }

    pub async fn record_failure(&self, host: &str) {
        let mut hosts = self.hosts.lock().await;
        let circuit = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostCircuit::new(self.config.window_size));

        if circuit.opened_at.is_some() {
            warn!(host = %host, "Circuit breaker probe failed, re-opening");
            circuit.opened_at = Some(Instant::now());
            circuit.probe_in_flight = false;
            return;
        }

        self.push_outcome(circuit, false);

        let rate = circuit.failure_rate();
        if circuit.outcomes.len() >= self.config.min_requests
            && rate >= self.config.failure_rate_threshold
        {
            warn!(
                host = %host,
                failure_rate = rate,
                window = circuit.outcomes.len(),
                "Circuit breaker opened"
            );
            circuit.opened_at = Some(Instant::now());
        }
    }

    pub async fn state(&self, host: &str) -> CircuitState {
        self.hosts
            .lock()
            .await
            .get(host)
            .map_or(CircuitState::Closed, |c| c.state(self.config.open_duration))
    }

    fn push_outcome(&self, circuit: &mut HostCircuit, ok: bool) {
        if circuit.outcomes.len() >= self.config.window_size.max(1) {
            circuit.outcomes.pop_front();
        }
        circuit.outcomes.push_back(ok);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "hooks.example.com";

    fn breaker(open_duration: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            window_size: 4,
            min_requests: 3,
            failure_rate_threshold: 0.5,
            open_duration,
        })
    }

    #[tokio::test]
    async fn test_unknown_host_is_closed() {
        let breaker = breaker(Duration::from_secs(60));
        assert_eq!(breaker.state(HOST).await, CircuitState::Closed);
        assert!(breaker.check(HOST).await.is_ok());
    }

    #[tokio::test]
    async fn test_does_not_open_below_min_requests() {
        let breaker = breaker(Duration::from_secs(60));
        breaker.record_failure(HOST).await;
        breaker.record_failure(HOST).await;
        assert_eq!(breaker.state(HOST).await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_at_failure_rate_and_fails_fast() {
        let breaker = breaker(Duration::from_secs(60));
        breaker.record_success(HOST).await;
        breaker.record_failure(HOST).await;
        breaker.record_failure(HOST).await;

        assert_eq!(breaker.state(HOST).await, CircuitState::Open);
        assert_eq!(
            breaker.check(HOST).await,
            Err(WebhookError::CircuitOpen {
                host: HOST.to_string()
            })
        );
        assert!(breaker.check("other.example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_window_forgets_old_failures() {
        let breaker = breaker(Duration::from_secs(60));
        breaker.record_failure(HOST).await;
        for _ in 0..4 {
            breaker.record_success(HOST).await;
        }
        breaker.record_failure(HOST).await;
        assert_eq!(breaker.state(HOST).await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_allows_single_probe_then_closes() {
        let breaker = breaker(Duration::from_millis(10));
        for _ in 0..3 {
            breaker.record_failure(HOST).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(breaker.state(HOST).await, CircuitState::HalfOpen);
        assert!(breaker.check(HOST).await.is_ok());
        assert!(breaker.check(HOST).await.is_err());

        breaker.record_success(HOST).await;
        assert_eq!(breaker.state(HOST).await, CircuitState::Closed);
        assert!(breaker.check(HOST).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_probe_reopens() {
        let breaker = breaker(Duration::from_millis(10));
        for _ in 0..3 {
            breaker.record_failure(HOST).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.check(HOST).await.is_ok());

        breaker.record_failure(HOST).await;
        assert_eq!(breaker.state(HOST).await, CircuitState::Open);
    }
}
