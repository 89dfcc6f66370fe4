//! External queue poller: lease a message, fan its payload out to
//! parallel consumers, keep the lease alive, delete when done.
//!
//! [`QueuePoller::tick`] is the scheduler entry point. It never fails;
//! errors and cancellation push the next eligible poll out by
//! `backoff`. [`ShutdownListener`] coordinates with an in-flight poll
//! when the process is asked to stop.

mod fanout;
pub mod shutdown;
pub mod state;

pub use shutdown::{ShutdownConfig, ShutdownListener, ShutdownOutcome};
pub use state::PollState;

use crate::error::{Error, Result};
use crate::external::{ApiClient, BlobStore, MessageQueue};
use crate::model::external::ExternalMessage;
use crate::telemetry::metrics;
use crate::telemetry::spans::start_poll_span;
use fanout::{FanOut, LeaseRenewer};
use opentelemetry::KeyValue;
use state::StateTrail;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Configuration for the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Fixed delay between ticks when driven by [`QueuePoller::run`].
    pub interval: Duration,
    /// How long to wait before polling again after an empty queue or a failure.
    pub backoff: Duration,
    pub max_messages: usize,
    /// Capacity of the channel feeding payload lines to consumers.
    pub channel_capacity: usize,
    pub consumers: usize,
    pub renew_interval: Duration,
    pub visibility_timeout: Duration,
    /// Pause after each downstream call, in milliseconds.
    pub call_delay: Range<u64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            backoff: Duration::from_secs(60),
            max_messages: 1,
            channel_capacity: 200,
            consumers: 3,
            renew_interval: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(30),
            call_delay: 2_000..10_000,
        }
    }
}

impl PollerConfig {
    /// Reject settings that would spin or let a lease lapse mid-processing.
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("interval", self.interval),
            ("renew_interval", self.renew_interval),
            ("visibility_timeout", self.visibility_timeout),
        ];
        for (name, value) in nonzero {
            if value.is_zero() {
                return Err(Error::Config(format!("poller.{name} must be greater than zero")));
            }
        }
        if self.renew_interval >= self.visibility_timeout {
            return Err(Error::Config(format!(
                "poller.renew_interval ({:?}) must be shorter than poller.visibility_timeout ({:?})",
                self.renew_interval, self.visibility_timeout
            )));
        }
        let positive = [
            ("max_messages", self.max_messages),
            ("channel_capacity", self.channel_capacity),
            ("consumers", self.consumers),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("poller.{name} must be greater than zero")));
            }
        }
        if self.call_delay.start > self.call_delay.end {
            return Err(Error::Config(
                "poller.call_delay minimum must not exceed its maximum".to_string(),
            ));
        }
        Ok(())
    }
}

/// Schedule shared between the poll task and [`QueuePoller::cancel`].
#[derive(Debug, Default)]
struct Schedule {
    /// `None` means a poll may start immediately.
    next_eligible: Option<Instant>,
    /// Token of the poll in flight, if any.
    job: Option<CancellationToken>,
}

/// Polls an external queue and processes each leased message.
pub struct QueuePoller {
    queue: Arc<dyn MessageQueue>,
    blobs: Arc<dyn BlobStore>,
    api: Arc<dyn ApiClient>,
    config: PollerConfig,
    schedule: Mutex<Schedule>,
    processing: AtomicBool,
}

/// Clears the processing flag and the in-flight token however the poll ends.
struct ProcessingGuard<'a> {
    poller: &'a QueuePoller,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut schedule) = self.poller.schedule.lock() {
            schedule.job = None;
        }
        self.poller.processing.store(false, Ordering::SeqCst);
    }
}

impl QueuePoller {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        blobs: Arc<dyn BlobStore>,
        api: Arc<dyn ApiClient>,
        config: PollerConfig,
    ) -> Self {
        Self {
            queue,
            blobs,
            api,
            config,
            schedule: Mutex::new(Schedule::default()),
            processing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// True while a poll is in flight.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Earliest time the next poll may start, if one is scheduled.
    pub fn next_eligible(&self) -> Option<Instant> {
        self.schedule.lock().ok().and_then(|s| s.next_eligible)
    }

    /// Cancel the poll in flight and hold off the next one for `backoff`.
    pub fn cancel(&self) {
        let Ok(mut schedule) = self.schedule.lock() else {
            return;
        };
        schedule.next_eligible = Some(Instant::now() + self.config.backoff);
        if let Some(job) = schedule.job.take() {
            info!("cancelling in-flight poll");
            job.cancel();
        }
    }

    /// Run ticks with a fixed delay between them until `shutdown` fires.
    ///
    /// A tick already running when shutdown fires is allowed to finish.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval = ?self.config.interval, queue = self.queue.name(), "poller started");
        while !shutdown.is_cancelled() {
            self.tick().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
        info!("poller stopped");
    }

    /// One scheduled invocation. Skips when not yet eligible or when a poll is
    /// already running; never returns an error.
    pub async fn tick(&self) {
        let Some((token, _guard)) = self.begin() else {
            return;
        };

        let span = start_poll_span(self.queue.name());
        let mut trail = StateTrail::new(span.clone());
        let started = std::time::Instant::now();

        let result = self
            .poll_once(&token, &mut trail)
            .instrument(span.clone())
            .await;

        span.in_scope(|| {
            match result {
                Ok(0) => {
                    let next = self.back_off();
                    info!(backoff = ?self.config.backoff, ?next, "queue empty, backing off");
                }
                Ok(processed) => info!(processed, "poll finished"),
                Err(Error::Cancelled) => {
                    trail.advance(PollState::Cancelling);
                    self.back_off();
                    warn!(state = %trail.current(), "poll cancelled");
                }
                Err(e) => {
                    self.back_off();
                    error!(state = %trail.current(), error = %e, "poll failed, backing off");
                }
            }
            trail.advance(PollState::Idle);
        });
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1_000.0,
            &[KeyValue::new("operation", "poll")],
        );
    }

    /// Claim the schedule for a new poll, or `None` if not yet eligible
    /// or another poll is still in flight.
    fn begin(&self) -> Option<(CancellationToken, ProcessingGuard<'_>)> {
        let mut schedule = self.schedule.lock().ok()?;
        if schedule
            .next_eligible
            .is_some_and(|next| Instant::now() < next)
        {
            return None;
        }
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("previous poll still running, skipping tick");
            return None;
        }
        let token = CancellationToken::new();
        schedule.job = Some(token.clone());
        Some((token, ProcessingGuard { poller: self }))
    }

    fn back_off(&self) -> Instant {
        let next = Instant::now() + self.config.backoff;
        if let Ok(mut schedule) = self.schedule.lock() {
            schedule.next_eligible = Some(next);
        }
        next
    }

    /// Receive and fully process up to `max_messages`. Returns how many were processed.
    ///
    /// Every leased message is renewed from receipt until it is deleted or the
    /// poll ends, including messages still waiting behind the current one.
    async fn poll_once(&self, token: &CancellationToken, trail: &mut StateTrail) -> Result<usize> {
        trail.advance(PollState::Polling);
        let messages = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            received = self.queue.receive(self.config.max_messages) => received?,
        };

        let leased: Vec<(ExternalMessage, LeaseRenewer)> = messages
            .into_iter()
            .map(|message| {
                let lease = LeaseRenewer::spawn(
                    Arc::clone(&self.queue),
                    message.receipt_handle.clone(),
                    &self.config,
                    token,
                );
                (message, lease)
            })
            .collect();

        let mut processed = 0;
        for (message, lease) in leased {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.process_message(&message, lease, token, trail).await?;
            processed += 1;
        }
        Ok(processed)
    }

    async fn process_message(
        &self,
        message: &ExternalMessage,
        lease: LeaseRenewer,
        token: &CancellationToken,
        trail: &mut StateTrail,
    ) -> Result<()> {
        trail.span().record("poll.message_id", message.id.as_str());
        info!(message_id = %message.id, key = %message.body, "message leased");

        trail.advance(PollState::Leasing);
        let bytes = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            bytes = self.blobs.get(&message.body) => bytes?,
        };
        let content = String::from_utf8(bytes)
            .map_err(|e| Error::Other(format!("blob {} is not UTF-8: {e}", message.body)))?;
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        info!(lines = lines.len(), "payload split");

        trail.advance(PollState::FanOut);
        let fan_out = FanOut::launch(lines, Arc::clone(&self.api), &self.config, token.child_token());

        trail.advance(PollState::Draining);
        let joined = fan_out.join().await;
        let renewals = lease.stop().await;
        let posted = joined?;
        info!(posted, renewals, "consumers finished");

        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        trail.advance(PollState::Deleting);
        self.queue.delete(&message.receipt_handle).await?;
        info!(message_id = %message.id, "message deleted");
        Ok(())
    }
}
