//! States a poll moves through, recorded on the poll span.

use crate::telemetry::spans::record_state_transition;
use tracing::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    /// Payload fetched and queued for consumers.
    Leasing,
    FanOut,
    Draining,
    Deleting,
    Cancelling,
}

impl PollState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Leasing => "leasing",
            Self::FanOut => "fan_out",
            Self::Draining => "draining",
            Self::Deleting => "deleting",
            Self::Cancelling => "cancelling",
        }
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of one poll plus the span transitions are written to.
pub(crate) struct StateTrail {
    span: Span,
    current: PollState,
}

impl StateTrail {
    pub(crate) fn new(span: Span) -> Self {
        Self {
            span,
            current: PollState::Idle,
        }
    }

    pub(crate) fn advance(&mut self, to: PollState) {
        record_state_transition(&self.span, self.current.as_str(), to.as_str());
        self.current = to;
    }

    pub(crate) fn current(&self) -> PollState {
        self.current
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }
}
