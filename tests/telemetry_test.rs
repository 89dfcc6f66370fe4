//! Integration tests for telemetry initialization and span helpers.

use jobq::model::job::MessageId;
use jobq::poller::PollState;

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be installed once per process, so a
    // second init in the same binary returns Err; either way no exporter runs.
    let config = jobq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "jobq-test".to_string(),
        default_filter: "debug".to_string(),
    };
    if let Ok(guard) = jobq::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn job_span_creates() {
    let _span = jobq::telemetry::spans::start_job_span("request_reply", MessageId(42), 0);
}

#[test]
fn poll_span_records_transitions() {
    let span = jobq::telemetry::spans::start_poll_span("jobq");
    span.record("poll.message_id", "17");
    jobq::telemetry::spans::record_state_transition(
        &span,
        PollState::Idle.as_str(),
        PollState::Polling.as_str(),
    );
}

#[test]
fn poll_states_have_stable_labels() {
    assert_eq!(PollState::FanOut.to_string(), "fan_out");
    assert_eq!(PollState::Cancelling.as_str(), "cancelling");
}

#[test]
fn instruments_work_without_provider() {
    use opentelemetry::KeyValue;

    jobq::telemetry::metrics::jobs_submitted().add(1, &[KeyValue::new("kind", "fire_and_forget")]);
    jobq::telemetry::metrics::lease_renewals().add(1, &[]);
    jobq::telemetry::metrics::operation_duration_ms()
        .record(12.5, &[KeyValue::new("operation", "poll")]);
}
