//! Contracts for the systems the poller talks to, plus implementations.
//!
//! - [`MessageQueue`]: a leasing queue (receive, extend visibility, delete).
//! - [`BlobStore`]: keyed byte storage holding message payloads.
//! - [`ApiClient`]: the downstream API each payload line is posted to.

pub mod fs;
pub mod http;
pub mod memory;

use crate::error::Result;
use crate::model::external::ExternalMessage;
use async_trait::async_trait;
use std::time::Duration;

pub use fs::FsBlobStore;
pub use http::HttpApiClient;
pub use memory::{InMemoryBlobStore, InMemoryQueue};

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Lease up to `max` messages. An empty vector means the queue had nothing visible.
    async fn receive(&self, max: usize) -> Result<Vec<ExternalMessage>>;

    /// Hide the message from other consumers for `timeout` from now.
    async fn change_visibility(&self, receipt_handle: &str, timeout: Duration) -> Result<()>;

    /// Remove a fully processed message.
    async fn delete(&self, receipt_handle: &str) -> Result<()>;

    /// Enqueue a message body. Returns the new message id.
    async fn send(&self, body: &str) -> Result<String>;

    /// Name used in logs and metric labels.
    fn name(&self) -> &str;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
}

#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn post(&self, payload: &str) -> Result<String>;
}

/// Store a payload of lines `0..=last_line` under `key` and enqueue the key.
///
/// Returns the id of the enqueued message.
pub async fn seed(
    queue: &dyn MessageQueue,
    blobs: &dyn BlobStore,
    key: &str,
    last_line: u32,
) -> Result<String> {
    let content = (0..=last_line)
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    blobs.put(key, content.into_bytes()).await?;
    let id = queue.send(key).await?;
    tracing::info!(key, id = %id, lines = last_line + 1, "payload seeded");
    Ok(id)
}
