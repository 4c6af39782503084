//! Generic retry policy for fallible async operations.
//!
//! Semantics:
//! - `max_retries` counts retries after the first attempt, so a policy with
//!   `max_retries = 3` makes at most 4 attempts.
//! - `should_retry` decides whether a failure is worth another attempt;
//!   non-transient failures (permission denied, unauthenticated, invalid
//!   argument, not found) must return `false` and surface after exactly one
//!   attempt.
//! - Delay before retry `n` (1-indexed) is `base * 2^(n-1)` capped at
//!   `max_delay`, plus a uniform random jitter in `[0, jitter]`.
//! - The sleeper is injectable (`TokioSleeper` in production,
//!   `InstantSleeper`/`TrackingSleeper` in tests).
//!
//! Invariants:
//! - Attempts never exceed `max_retries + 1`.
//! - The error returned is always the one from the final attempt.

use crate::sleeper::{Sleeper, TokioSleeper};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct RetryPolicy<E> {
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl<E> RetryPolicy<E>
where
    E: std::fmt::Display + Send + Sync + 'static,
{
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Run `operation`, retrying per policy. Returns the last error when
    /// every permitted attempt has failed.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, E>
    where
        T: Send,
        Fut: Future<Output = Result<T, E>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let mut attempt = 0usize;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= self.max_retries || !(self.should_retry)(&e) {
                        return Err(e);
                    }
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    tracing::debug!(attempt, ?delay, error = %e, "retrying after failure");
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }

    /// Delay before retry `attempt` (1-indexed).
    fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
        let multiplier = 2u128.saturating_pow(exponent);
        let nanos = self.base_delay.as_nanos().saturating_mul(multiplier);
        let backoff = Duration::from_nanos(nanos.min(self.max_delay.as_nanos()) as u64);
        backoff + random_jitter(self.jitter)
    }
}

fn random_jitter(upper: Duration) -> Duration {
    let millis = u64::try_from(upper.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=millis))
}

pub struct RetryPolicyBuilder<E> {
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> RetryPolicyBuilder<E>
where
    E: std::fmt::Display + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: Duration::from_millis(1000),
            should_retry: Arc::new(|_| true),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn base_delay(mut self, base: Duration) -> Self {
        self.base_delay = base;
        self
    }

    pub fn max_delay(mut self, max: Duration) -> Self {
        self.max_delay = max;
        self
    }

    /// Upper bound of the uniform random addition to every delay. Zero makes
    /// delays deterministic.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> RetryPolicy<E> {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            jitter: self.jitter,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
        }
    }
}

impl<E> Default for RetryPolicyBuilder<E>
where
    E: std::fmt::Display + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
