//! Shared fakes for poller tests: a queue and an API that record every call
//! into one journal so tests can assert on call order.

#![allow(dead_code)]

use async_trait::async_trait;
use jobq::error::{Error, Result};
use jobq::external::{ApiClient, InMemoryQueue, MessageQueue};
use jobq::model::external::ExternalMessage;
use jobq::poller::PollerConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Receive,
    ChangeVisibility,
    Delete,
    Post(String),
}

#[derive(Debug, Default)]
pub struct Journal {
    calls: Mutex<Vec<Call>>,
}

impl Journal {
    pub fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Post(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }
}

pub struct RecordingQueue {
    pub inner: InMemoryQueue,
    journal: Arc<Journal>,
}

impl RecordingQueue {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            inner: InMemoryQueue::new("test_queue", Duration::from_secs(30)),
            journal,
        }
    }
}

#[async_trait]
impl MessageQueue for RecordingQueue {
    async fn receive(&self, max: usize) -> Result<Vec<ExternalMessage>> {
        self.journal.record(Call::Receive);
        self.inner.receive(max).await
    }

    async fn change_visibility(&self, receipt_handle: &str, timeout: Duration) -> Result<()> {
        self.journal.record(Call::ChangeVisibility);
        self.inner.change_visibility(receipt_handle, timeout).await
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.journal.record(Call::Delete);
        self.inner.delete(receipt_handle).await
    }

    async fn send(&self, body: &str) -> Result<String> {
        self.inner.send(body).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Records each post after sleeping `latency`; fails on `fail_on`.
pub struct RecordingApi {
    journal: Arc<Journal>,
    latency: Duration,
    fail_on: Option<String>,
}

impl RecordingApi {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            latency: Duration::ZERO,
            fail_on: None,
        }
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_on(mut self, line: &str) -> Self {
        self.fail_on = Some(line.to_string());
        self
    }
}

#[async_trait]
impl ApiClient for RecordingApi {
    async fn post(&self, payload: &str) -> Result<String> {
        tokio::time::sleep(self.latency).await;
        if self.fail_on.as_deref() == Some(payload) {
            return Err(Error::Processing(format!("downstream rejected {payload}")));
        }
        self.journal.record(Call::Post(payload.to_string()));
        Ok(format!("ok {payload}"))
    }
}

/// Poller settings scaled down for tests.
pub fn test_config() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(500),
        backoff: Duration::from_secs(60),
        max_messages: 1,
        channel_capacity: 200,
        consumers: 3,
        renew_interval: Duration::from_secs(20),
        visibility_timeout: Duration::from_secs(30),
        call_delay: 10..50,
    }
}
