//! Span helpers for jobs and external-queue polls.

use crate::model::job::MessageId;
use tracing::Span;

/// Start a span for one job handled by a worker.
pub fn start_job_span(kind: &str, id: MessageId, worker: usize) -> Span {
    tracing::info_span!(
        "job.process",
        "job.kind" = kind,
        "job.id" = %id,
        "job.worker" = worker,
    )
}

/// Start a span for one poll of the external queue.
///
/// `poll.message_id` is declared empty and filled once a message is leased.
pub fn start_poll_span(queue: &str) -> Span {
    tracing::info_span!(
        "poll.execute",
        "poll.queue" = queue,
        "poll.message_id" = tracing::field::Empty,
        "poll.state" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("poll.state", to);
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "state_transition");
    });
}
