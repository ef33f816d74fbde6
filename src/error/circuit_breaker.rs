//! Circuit breaker: `Closed -> Open -> HalfOpen` state machine used as an optional
//! collaborator by [`crate::resilience`] strategies.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub name: String,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// How long the circuit stays open before probing with a half-open call.
    pub timeout: Duration,
    /// Sampling window used to decide whether `failure_threshold` has been reached.
    pub window: Duration,
    pub on_state_change: Option<Arc<dyn Fn(CircuitState) + Send + Sync>>,
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("timeout", &self.timeout)
            .field("window", &self.window)
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            window: Duration::from_secs(60),
            on_state_change: None,
        }
    }
}

/// Point-in-time counters for observability.
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<CircuitState>>,
    failure_count: Arc<AtomicU32>,
    success_count: Arc<AtomicU32>,
    last_failure_time: Arc<Mutex<Option<Instant>>>,
    state_changed_at: Arc<Mutex<Instant>>,
    total_calls: Arc<AtomicU64>,
    total_failures: Arc<AtomicU64>,
    total_successes: Arc<AtomicU64>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            failure_count: Arc::new(AtomicU32::new(0)),
            success_count: Arc::new(AtomicU32::new(0)),
            last_failure_time: Arc::new(Mutex::new(None)),
            state_changed_at: Arc::new(Mutex::new(Instant::now())),
            total_calls: Arc::new(AtomicU64::new(0)),
            total_failures: Arc::new(AtomicU64::new(0)),
            total_successes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current state, lazily transitioning `Open -> HalfOpen` once `timeout` has elapsed.
    pub async fn state(&self) -> CircuitState {
        let current = *self.state.read().await;
        if current == CircuitState::Open {
            let elapsed = {
                let changed_at = self.state_changed_at.lock().unwrap();
                changed_at.elapsed()
            };
            if elapsed >= self.config.timeout {
                self.transition_to(CircuitState::HalfOpen).await;
                return CircuitState::HalfOpen;
            }
        }
        current
    }

    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, WorkflowError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, WorkflowError>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        if self.state().await == CircuitState::Open {
            return Err(WorkflowError::CircuitOpen {
                name: self.config.name.clone(),
            });
        }

        match f().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(err)
            }
        }
    }

    async fn on_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let state = self.state().await;
        if state == CircuitState::HalfOpen {
            let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
            if successes >= self.config.success_threshold {
                self.failure_count.store(0, Ordering::Relaxed);
                self.success_count.store(0, Ordering::Relaxed);
                self.transition_to(CircuitState::Closed).await;
            }
        } else if state == CircuitState::Closed {
            self.failure_count.store(0, Ordering::Relaxed);
        }
    }

    async fn on_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_failure_time.lock().unwrap() = Some(Instant::now());

        let state = self.state().await;
        if state == CircuitState::HalfOpen {
            self.success_count.store(0, Ordering::Relaxed);
            self.transition_to(CircuitState::Open).await;
            return;
        }

        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.failure_threshold {
            self.transition_to(CircuitState::Open).await;
        }
    }

    async fn transition_to(&self, new_state: CircuitState) {
        let mut state = self.state.write().await;
        if *state != new_state {
            *state = new_state;
            *self.state_changed_at.lock().unwrap() = Instant::now();
            if let Some(callback) = &self.config.on_state_change {
                callback(new_state);
            }
            tracing::info!(circuit = %self.config.name, new_state = %new_state, "circuit breaker transitioned");
        }
    }

    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            state: self.state().await,
            failure_count: self.failure_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
        }
    }

    pub async fn reset(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.transition_to(CircuitState::Closed).await;
    }
}

pub struct CircuitBreakerBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: CircuitBreakerConfig {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    pub fn failure_threshold(mut self, value: u32) -> Self {
        self.config.failure_threshold = value;
        self
    }

    pub fn success_threshold(mut self, value: u32) -> Self {
        self.config.success_threshold = value;
        self
    }

    pub fn timeout(mut self, value: Duration) -> Self {
        self.config.timeout = value;
        self
    }

    pub fn window(mut self, value: Duration) -> Self {
        self.config.window = value;
        self
    }

    pub fn on_state_change(mut self, callback: Arc<dyn Fn(CircuitState) + Send + Sync>) -> Self {
        self.config.on_state_change = Some(callback);
        self
    }

    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let breaker = CircuitBreakerBuilder::new("test")
            .failure_threshold(2)
            .build();

        for _ in 0..2 {
            let _ = breaker
                .call(|| async { Err::<(), _>(WorkflowError::Internal("boom".into())) })
                .await;
        }

        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn blocks_calls_when_open() {
        let breaker = CircuitBreakerBuilder::new("test").failure_threshold(1).build();
        let _ = breaker
            .call(|| async { Err::<(), _>(WorkflowError::Internal("boom".into())) })
            .await;

        let result = breaker.call(|| async { Ok::<_, WorkflowError>(1) }).await;
        assert!(matches!(result, Err(WorkflowError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let breaker = CircuitBreakerBuilder::new("test")
            .failure_threshold(1)
            .success_threshold(1)
            .timeout(Duration::from_millis(10))
            .build();

        let _ = breaker
            .call(|| async { Err::<(), _>(WorkflowError::Internal("boom".into())) })
            .await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        let _ = breaker.call(|| async { Ok::<_, WorkflowError>(1) }).await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn metrics_reflect_totals() {
        let breaker = CircuitBreakerBuilder::new("test").failure_threshold(5).build();
        let _ = breaker.call(|| async { Ok::<_, WorkflowError>(1) }).await;
        let _ = breaker
            .call(|| async { Err::<(), _>(WorkflowError::Internal("boom".into())) })
            .await;

        let metrics = breaker.metrics().await;
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.total_successes, 1);
        assert_eq!(metrics.total_failures, 1);
    }
}
