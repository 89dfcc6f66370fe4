//! Retry as an explicit wrapper around a fallible async operation.

use super::processor::Processor;
use crate::error::Result;
use crate::model::job::{WorkInput, WorkResult};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub delay: Duration,
    /// Growth factor applied to `delay` after each failure.
    pub multiplier: f64,
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
            multiplier: 1.0,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            ..Self::default()
        }
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(0.0).powi(retry as i32).min(1e6);
        let delay = self.delay.mul_f64(factor);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// Returns the last error when every attempt fails.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                let delay = policy.delay_for(attempt - 1);
                warn!(attempt, attempts, ?delay, error = %e, "attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A processor that retries the wrapped processor according to a policy.
#[derive(Debug)]
pub struct Retrying<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P> Retrying<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<P: Processor> Processor for Retrying<P> {
    async fn process(&self, input: WorkInput) -> Result<WorkResult> {
        retry(&self.policy, || self.inner.process(input.clone())).await
    }
}
