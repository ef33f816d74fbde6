//! Resilience strategies: policy objects that decide whether a failed attempt should be
//! retried and how long to wait before the next one. [`CircuitBreakerStrategy`] wraps
//! [`crate::error::circuit_breaker::CircuitBreaker`] as one more strategy implementation
//! rather than a separate concept bolted onto the smith.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::circuit_breaker::CircuitBreaker;
use crate::error::WorkflowError;

/// A pluggable retry policy. Attempt numbers are 1-based.
#[async_trait]
pub trait ResilienceStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn should_retry(&self, attempt: u32, error: &WorkflowError) -> bool;

    fn retry_delay(&self, attempt: u32) -> Duration;

    /// Run `operation` under this strategy, retrying per `should_retry`/`retry_delay`
    /// until it succeeds, a non-retryable error is hit, or `cancel` fires.
    ///
    /// Generic, so it carries `Self: Sized` like the rest of the object-safe-trait-plus-
    /// generic-helper idiom: `Box<dyn ResilienceStrategy>` callers use `should_retry`/
    /// `retry_delay` directly instead.
    async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, WorkflowError>
    where
        Self: Sized,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, WorkflowError>> + Send,
        T: Send,
    {
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !self.should_retry(attempt, &err) {
                        return Err(err);
                    }
                    tokio::time::sleep(self.retry_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Exponential backoff with optional jitter, capped at `max_delay`.
pub struct ExponentialBackoffStrategy {
    pub name: String,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub use_jitter: bool,
}

impl ExponentialBackoffStrategy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            name: "exponential-backoff".to_string(),
            max_attempts,
            base_delay,
            max_delay,
            use_jitter: true,
        }
    }
}

#[async_trait]
impl ResilienceStrategy for ExponentialBackoffStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_retry(&self, attempt: u32, _error: &WorkflowError) -> bool {
        attempt < self.max_attempts
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let scaled = self.base_delay.as_millis().saturating_mul(1u128 << exponent);
        let capped = scaled.min(self.max_delay.as_millis());
        let millis = if self.use_jitter && capped > 0 {
            rand::thread_rng().gen_range(0..=capped) as u64
        } else {
            capped as u64
        };
        Duration::from_millis(millis)
    }
}

/// Constant delay between attempts.
pub struct FixedIntervalStrategy {
    pub name: String,
    pub max_attempts: u32,
    pub delay: Duration,
}

impl FixedIntervalStrategy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            name: "fixed-interval".to_string(),
            max_attempts,
            delay,
        }
    }
}

#[async_trait]
impl ResilienceStrategy for FixedIntervalStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_retry(&self, attempt: u32, _error: &WorkflowError) -> bool {
        attempt < self.max_attempts
    }

    fn retry_delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// A random delay within `[min_delay, max_delay]` between attempts.
pub struct RandomIntervalStrategy {
    pub name: String,
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RandomIntervalStrategy {
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            name: "random-interval".to_string(),
            max_attempts,
            min_delay,
            max_delay,
        }
    }
}

#[async_trait]
impl ResilienceStrategy for RandomIntervalStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_retry(&self, attempt: u32, _error: &WorkflowError) -> bool {
        attempt < self.max_attempts
    }

    fn retry_delay(&self, _attempt: u32) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        if max <= min {
            return self.min_delay;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Wraps a [`CircuitBreaker`] as a resilience strategy: `execute` fails fast with
/// `WorkflowError::CircuitOpen` instead of invoking the operation when the circuit is open,
/// and never retries internally (the circuit breaker is usually composed with one of the
/// delay-based strategies above at a higher level).
pub struct CircuitBreakerStrategy {
    pub name: String,
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerStrategy {
    pub fn new(name: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            name: name.into(),
            breaker,
        }
    }

    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, WorkflowError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>>,
    {
        self.breaker.call(operation).await
    }
}

#[async_trait]
impl ResilienceStrategy for CircuitBreakerStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_retry(&self, _attempt: u32, error: &WorkflowError) -> bool {
        !matches!(error, WorkflowError::CircuitOpen { .. })
    }

    fn retry_delay(&self, _attempt: u32) -> Duration {
        Duration::from_millis(0)
    }
}
