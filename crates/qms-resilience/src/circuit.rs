use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    pub fail_max: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            fail_max: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub endpoint: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Per-endpoint closed/open/half-open breaker. One failing vendor API
/// stops hammering itself without affecting adapters for other vendors.
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_probe_in_flight: bool,
    config: CircuitConfig,
}

pub struct CircuitBreaker {
    endpoint: String,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    fn new(endpoint: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_probe_in_flight: false,
                config,
            }),
        }
    }

    /// Returns `Ok(())` if a call may proceed, transitioning `Open` to
    /// `HalfOpen` once `reset_timeout` has elapsed and admitting exactly
    /// one probing call. Returns the seconds until retry otherwise.
    pub async fn try_acquire(&self) -> Result<(), u64> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    Err(1)
                } else {
                    inner.half_open_probe_in_flight = true;
                    Ok(())
                }
            }
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed >= inner.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_probe_in_flight = true;
                    Ok(())
                } else {
                    Err((inner.config.reset_timeout - elapsed).as_secs().max(1))
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.half_open_probe_in_flight = false;
    }

    /// `permanent` failures (4xx user errors) don't count toward the
    /// breaker tripping; only `transient` failures (timeouts, 5xx,
    /// connection errors) do, matching the error taxonomy's retry policy.
    pub async fn record_failure(&self, transient: bool) {
        let mut inner = self.inner.lock().await;
        inner.half_open_probe_in_flight = false;

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            return;
        }

        if !transient {
            return;
        }

        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= inner.config.fail_max {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub async fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock().await;
        CircuitSnapshot {
            endpoint: self.endpoint.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
        }
    }
}

/// Shared registry so every adapter instance for the same vendor endpoint
/// observes the same breaker state, keyed by endpoint name.
#[derive(Clone, Default)]
pub struct CircuitRegistry {
    breakers: Arc<Mutex<HashMap<String, Arc<CircuitBreaker>>>>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, endpoint: &str, config: CircuitConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().await;
        breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(endpoint, config)))
            .clone()
    }

    pub async fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let breakers = self.breakers.lock().await;
        let mut out = Vec::with_capacity(breakers.len());
        for breaker in breakers.values() {
            out.push(breaker.snapshot().await);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitConfig {
        CircuitConfig {
            fail_max: 2,
            reset_timeout: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn opens_after_consecutive_transient_failures() {
        let breaker = CircuitBreaker::new("pubmed", fast_config());
        assert!(breaker.try_acquire().await.is_ok());
        breaker.record_failure(true).await;
        assert!(breaker.try_acquire().await.is_ok());
        breaker.record_failure(true).await;
        assert!(breaker.try_acquire().await.is_err());
    }

    #[tokio::test]
    async fn permanent_failures_do_not_trip_the_breaker() {
        let breaker = CircuitBreaker::new("pubmed", fast_config());
        breaker.record_failure(false).await;
        breaker.record_failure(false).await;
        breaker.record_failure(false).await;
        assert!(breaker.try_acquire().await.is_ok());
    }

    #[tokio::test]
    async fn half_open_admits_one_probe_then_closes_on_success() {
        let breaker = CircuitBreaker::new("pubmed", fast_config());
        breaker.record_failure(true).await;
        breaker.record_failure(true).await;
        assert!(breaker.try_acquire().await.is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.try_acquire().await.is_ok());
        assert!(breaker.try_acquire().await.is_err());

        breaker.record_success().await;
        assert!(breaker.try_acquire().await.is_ok());
    }

    #[tokio::test]
    async fn registry_shares_breaker_state_per_endpoint() {
        let registry = CircuitRegistry::new();
        let a = registry.get_or_create("arxiv", fast_config()).await;
        let b = registry.get_or_create("arxiv", fast_config()).await;
        a.record_failure(true).await;
        a.record_failure(true).await;
        assert_eq!(b.snapshot().await.state, CircuitState::Open);
    }
}
