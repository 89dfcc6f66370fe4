//! [`MessageQueue`] over pgmq via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.set_vt, pgmq.delete. Message bodies are stored as
//! `{"key": "<blob key>"}` and the receipt handle is the pgmq `msg_id`.

use super::Db;
use crate::error::{Error, Result};
use crate::external::MessageQueue;
use crate::model::external::ExternalMessage;
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;

type MessageRow = (
    i64,
    i32,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::Utc>,
    serde_json::Value,
);

/// A named pgmq queue.
pub struct PgmqQueue {
    db: Arc<Db>,
    queue_name: String,
    /// Lease applied by `receive`.
    visibility_timeout: Duration,
}

impl PgmqQueue {
    pub fn new(db: Arc<Db>, queue_name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            db,
            queue_name: queue_name.into(),
            visibility_timeout,
        }
    }

    /// Create the queue (idempotent).
    pub async fn create(&self) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(&self.queue_name)
            .execute(self.db.pool())
            .await?;
        self.count("create");
        Ok(())
    }

    fn count(&self, operation: &'static str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue_name.clone()),
                KeyValue::new("operation", operation),
            ],
        );
    }
}

fn seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

fn msg_id(receipt_handle: &str) -> Result<i64> {
    receipt_handle
        .parse()
        .map_err(|_| Error::Other(format!("bad pgmq receipt handle {receipt_handle:?}")))
}

#[async_trait]
impl MessageQueue for PgmqQueue {
    async fn receive(&self, max: usize) -> Result<Vec<ExternalMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, $3)",
        )
        .bind(&self.queue_name)
        .bind(seconds(self.visibility_timeout))
        .bind(i32::try_from(max).unwrap_or(i32::MAX))
        .fetch_all(self.db.pool())
        .await?;

        let messages = rows
            .into_iter()
            .map(|(msg_id, _read_ct, enqueued_at, _vt, message)| {
                let body = message
                    .get("key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        Error::Other(format!("bad pgmq payload for {msg_id}: missing key"))
                    })?
                    .to_string();
                Ok(ExternalMessage {
                    id: msg_id.to_string(),
                    body,
                    receipt_handle: msg_id.to_string(),
                    enqueued_at: Some(enqueued_at),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.count(if messages.is_empty() {
            "receive_empty"
        } else {
            "receive"
        });
        Ok(messages)
    }

    async fn change_visibility(&self, receipt_handle: &str, timeout: Duration) -> Result<()> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.set_vt($1, $2, $3)",
        )
        .bind(&self.queue_name)
        .bind(msg_id(receipt_handle)?)
        .bind(seconds(timeout))
        .fetch_all(self.db.pool())
        .await?;
        if rows.is_empty() {
            return Err(Error::NotFound(format!("pgmq message {receipt_handle}")));
        }
        self.count("change_visibility");
        Ok(())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        let (deleted,): (bool,) = sqlx::query_as("SELECT pgmq.delete($1, $2)")
            .bind(&self.queue_name)
            .bind(msg_id(receipt_handle)?)
            .fetch_one(self.db.pool())
            .await?;
        if !deleted {
            return Err(Error::NotFound(format!("pgmq message {receipt_handle}")));
        }
        self.count("delete");
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<String> {
        let payload = serde_json::json!({ "key": body });
        let (msg_id,): (i64,) = sqlx::query_as("SELECT * FROM pgmq.send($1, $2, 0)")
            .bind(&self.queue_name)
            .bind(&payload)
            .fetch_one(self.db.pool())
            .await?;
        self.count("send");
        Ok(msg_id.to_string())
    }

    fn name(&self) -> &str {
        &self.queue_name
    }
}
