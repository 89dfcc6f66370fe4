//! In-process implementations, used by `serve --local` and tests.

use super::{BlobStore, MessageQueue};
use crate::error::{Error, Result};
use crate::model::external::ExternalMessage;
use crate::telemetry::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug)]
struct Entry {
    id: String,
    body: String,
    enqueued_at: DateTime<Utc>,
    visible_at: Instant,
    receipt_handle: Option<String>,
}

/// A queue with lease semantics: received messages stay hidden until their
/// visibility timeout lapses, then become receivable again under a new receipt.
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    visibility_timeout: Duration,
    entries: Mutex<VecDeque<Entry>>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Messages not yet deleted, visible or not.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<Entry>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Other("in-memory queue lock poisoned".to_string()))
    }

    fn count(&self, operation: &'static str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.name.clone()),
                KeyValue::new("operation", operation),
            ],
        );
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn receive(&self, max: usize) -> Result<Vec<ExternalMessage>> {
        let now = Instant::now();
        let messages: Vec<ExternalMessage> = {
            let mut entries = self.lock()?;
            entries
                .iter_mut()
                .filter(|entry| entry.visible_at <= now)
                .take(max)
                .map(|entry| {
                    let receipt = Uuid::new_v4().to_string();
                    entry.visible_at = now + self.visibility_timeout;
                    entry.receipt_handle = Some(receipt.clone());
                    ExternalMessage {
                        id: entry.id.clone(),
                        body: entry.body.clone(),
                        receipt_handle: receipt,
                        enqueued_at: Some(entry.enqueued_at),
                    }
                })
                .collect()
        };
        self.count(if messages.is_empty() {
            "receive_empty"
        } else {
            "receive"
        });
        Ok(messages)
    }

    async fn change_visibility(&self, receipt_handle: &str, timeout: Duration) -> Result<()> {
        {
            let mut entries = self.lock()?;
            let entry = entries
                .iter_mut()
                .find(|entry| entry.receipt_handle.as_deref() == Some(receipt_handle))
                .ok_or_else(|| Error::NotFound(format!("receipt handle {receipt_handle}")))?;
            entry.visible_at = Instant::now() + timeout;
        }
        self.count("change_visibility");
        Ok(())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        {
            let mut entries = self.lock()?;
            let index = entries
                .iter()
                .position(|entry| entry.receipt_handle.as_deref() == Some(receipt_handle))
                .ok_or_else(|| Error::NotFound(format!("receipt handle {receipt_handle}")))?;
            entries.remove(index);
        }
        self.count("delete");
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.lock()?.push_back(Entry {
            id: id.clone(),
            body: body.to_string(),
            enqueued_at: Utc::now(),
            visible_at: Instant::now(),
            receipt_handle: None,
        });
        self.count("send");
        Ok(id)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Blob store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .map_err(|_| Error::Other("blob store lock poisoned".to_string()))?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("blob {key}")))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.blobs
            .lock()
            .map_err(|_| Error::Other("blob store lock poisoned".to_string()))?
            .insert(key.to_string(), bytes);
        Ok(())
    }
}
