//! Messages and payloads handled by the job queue actor.

use crate::engine::ReplyHandle;
use serde::{Deserialize, Serialize};

/// Correlation id of a submitted message. Unique only for logging; never used for dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u32);

impl MessageId {
    /// A random id in `0..=10000`, the range request handlers draw from.
    pub fn random() -> Self {
        use rand::Rng as _;
        Self(rand::thread_rng().gen_range(0..=10_000))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input handed to a processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkInput {
    pub input_data: i64,
}

impl WorkInput {
    pub fn new(input_data: i64) -> Self {
        Self { input_data }
    }
}

/// What a processor produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkResult {
    pub result_data: String,
}

impl std::fmt::Display for WorkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.result_data)
    }
}

/// A message sitting in the job mailbox.
#[derive(Debug)]
pub enum ProcessMessage {
    /// Processed in the background; the submitter only gets an acknowledgment.
    FireAndForget { id: MessageId, input: WorkInput },
    /// The worker resolves `reply` exactly once with the result or the failure cause.
    RequestReply {
        id: MessageId,
        input: WorkInput,
        reply: ReplyHandle<WorkResult>,
    },
}

impl ProcessMessage {
    pub fn fire_and_forget(id: MessageId, input: WorkInput) -> Self {
        Self::FireAndForget { id, input }
    }

    /// Build a request/reply message and return the handle the submitter waits on.
    pub fn request_reply(id: MessageId, input: WorkInput) -> (Self, ReplyHandle<WorkResult>) {
        let reply = ReplyHandle::new();
        let message = Self::RequestReply {
            id,
            input,
            reply: reply.clone(),
        };
        (message, reply)
    }

    pub fn id(&self) -> MessageId {
        match self {
            Self::FireAndForget { id, .. } | Self::RequestReply { id, .. } => *id,
        }
    }

    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FireAndForget { .. } => "fire_and_forget",
            Self::RequestReply { .. } => "request_reply",
        }
    }
}
