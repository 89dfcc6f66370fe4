//! Processors: the unit of work executed by job queue workers.

use crate::error::{Error, Result};
use crate::model::job::{WorkInput, WorkResult};
use async_trait::async_trait;
use rand::Rng as _;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Turns a [`WorkInput`] into a [`WorkResult`].
///
/// Implementations are shared between workers and must not rely on
/// per-call mutable state outside of atomics.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, input: WorkInput) -> Result<WorkResult>;
}

#[async_trait]
impl<P: Processor + ?Sized> Processor for Arc<P> {
    async fn process(&self, input: WorkInput) -> Result<WorkResult> {
        (**self).process(input).await
    }
}

/// Simulates variable-cost work by sleeping a random time before answering.
#[derive(Debug, Clone)]
pub struct JobProcessor {
    name: String,
    /// Latency range in milliseconds.
    latency: Range<u64>,
}

impl JobProcessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: 1_000..5_000,
        }
    }

    pub fn with_latency(mut self, latency: Range<u64>) -> Self {
        self.latency = latency;
        self
    }

    fn pick_latency(&self) -> Duration {
        if self.latency.is_empty() {
            return Duration::from_millis(self.latency.start);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.latency.clone()))
    }
}

#[async_trait]
impl Processor for JobProcessor {
    async fn process(&self, input: WorkInput) -> Result<WorkResult> {
        let latency = self.pick_latency();
        debug!(processor = %self.name, input = input.input_data, ?latency, "processing");
        tokio::time::sleep(latency).await;
        let result = WorkResult {
            result_data: format!("{}, inputData: {}", self.name, input.input_data),
        };
        info!(processor = %self.name, %result, "processed");
        Ok(result)
    }
}

/// Fails every call except those whose running count is a multiple of `success_number`.
///
/// With `success_number = 3` the first two calls fail and the third succeeds,
/// which makes it a convenient target for retry policies.
#[derive(Debug)]
pub struct CountingProcessor {
    counter: AtomicU64,
    success_number: u64,
}

impl CountingProcessor {
    pub fn new(success_number: u64) -> Self {
        Self {
            counter: AtomicU64::new(0),
            success_number: success_number.max(1),
        }
    }

    /// Calls seen so far.
    pub fn count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for CountingProcessor {
    async fn process(&self, input: WorkInput) -> Result<WorkResult> {
        let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        if count % self.success_number != 0 {
            return Err(Error::Processing(format!(
                "count {count} is not a multiple of {}",
                self.success_number
            )));
        }
        Ok(WorkResult {
            result_data: format!("count: {count}, inputData: {}", input.input_data),
        })
    }
}
