//! Messages received from an external queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message leased from an external queue.
///
/// Never mutated after receipt. The lease is extended and the message
/// deleted by reference to `receipt_handle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMessage {
    pub id: String,
    /// Key of the blob holding the line-delimited payload.
    pub body: String,
    /// Opaque lease token issued by the queue for this delivery.
    pub receipt_handle: String,
    pub enqueued_at: Option<DateTime<Utc>>,
}
