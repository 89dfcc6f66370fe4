//! Metric instrument factories for jobq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"jobq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for jobq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("jobq")
}

/// Counter: jobs accepted into the mailbox.
/// Labels: `kind` ("fire_and_forget" | "request_reply").
pub fn jobs_submitted() -> Counter<u64> {
    meter()
        .u64_counter("jobq.jobs.submitted")
        .with_description("Number of jobs accepted into the mailbox")
        .build()
}

/// Counter: jobs finished by a worker.
/// Labels: `kind`, `result` ("ok" | "error").
pub fn jobs_processed() -> Counter<u64> {
    meter()
        .u64_counter("jobq.jobs.processed")
        .with_description("Number of jobs finished by workers")
        .build()
}

/// Counter: external queue operations (receive, change_visibility, delete, send).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("jobq.queue.operations")
        .with_description("Number of external queue operations")
        .build()
}

/// Counter: lease extensions issued while a message is being processed.
pub fn lease_renewals() -> Counter<u64> {
    meter()
        .u64_counter("jobq.poller.lease_renewals")
        .with_description("Number of visibility timeout extensions")
        .build()
}

/// Counter: payload lines handed to the downstream API.
/// Labels: `result` ("ok" | "error").
pub fn subunits_processed() -> Counter<u64> {
    meter()
        .u64_counter("jobq.poller.subunits")
        .with_description("Number of payload lines posted downstream")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("jobq.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
