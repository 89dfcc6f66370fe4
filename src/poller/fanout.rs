//! Fan-out of one payload across parallel consumers, and lease renewal
//! for the external message while they run.

use super::PollerConfig;
use crate::error::{Error, Result};
use crate::external::{ApiClient, MessageQueue};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use rand::Rng as _;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, error, info, warn};

type Lines = Arc<Mutex<mpsc::Receiver<String>>>;

/// Producer plus `consumers` tasks sharing one bounded channel of payload lines.
///
/// Dropping a `FanOut` aborts its consumers.
pub(crate) struct FanOut {
    consumers: JoinSet<Result<usize>>,
    producer: JoinHandle<()>,
    cancel: CancellationToken,
}

impl FanOut {
    pub(crate) fn launch(
        lines: Vec<String>,
        api: Arc<dyn ApiClient>,
        config: &PollerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let total = lines.len();

        let producer = {
            let cancel = cancel.clone();
            tokio::spawn(
                async move {
                    for line in lines {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            sent = tx.send(line) => if sent.is_err() { break },
                        }
                    }
                    debug!(total, "producer finished");
                }
                .in_current_span(),
            )
        };

        let rx: Lines = Arc::new(Mutex::new(rx));
        let mut consumers = JoinSet::new();
        for consumer in 0..config.consumers.max(1) {
            consumers.spawn(
                consume(
                    consumer,
                    Arc::clone(&rx),
                    Arc::clone(&api),
                    config.call_delay.clone(),
                    cancel.clone(),
                )
                .in_current_span(),
            );
        }

        Self {
            consumers,
            producer,
            cancel,
        }
    }

    /// Wait for every consumer. Returns the number of lines posted.
    ///
    /// The first consumer failure cancels the remaining consumers and is returned.
    pub(crate) async fn join(mut self) -> Result<usize> {
        let mut posted = 0;
        let mut first_error = None;
        while let Some(joined) = self.consumers.join_next().await {
            let failure = match joined {
                Ok(Ok(handled)) => {
                    posted += handled;
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => Error::Other(format!("consumer task failed: {e}")),
            };
            self.cancel.cancel();
            first_error.get_or_insert(failure);
        }
        if let Err(e) = (&mut self.producer).await {
            warn!("producer task failed: {e}");
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(posted),
        }
    }
}

async fn consume(
    consumer: usize,
    lines: Lines,
    api: Arc<dyn ApiClient>,
    call_delay: Range<u64>,
    cancel: CancellationToken,
) -> Result<usize> {
    info!(consumer, "consumer started");
    let mut handled = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = async { lines.lock().await.recv().await } => next,
        };
        let Some(line) = next else {
            break;
        };

        // A call in progress always completes before cancellation is observed.
        debug!(consumer, %line, "posting line");
        if let Err(e) = api.post(&line).await {
            metrics::subunits_processed().add(1, &[KeyValue::new("result", "error")]);
            error!(consumer, %line, error = %e, "api call failed");
            return Err(e);
        }
        metrics::subunits_processed().add(1, &[KeyValue::new("result", "ok")]);
        handled += 1;

        // The pause also follows the last line, so a consumer only sees the
        // channel close once it ends. Deletion waits for it.
        let pause = pick_delay(&call_delay);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
    info!(consumer, handled, "consumer finished");
    Ok(handled)
}

fn pick_delay(range: &Range<u64>) -> Duration {
    if range.is_empty() {
        return Duration::from_millis(range.start);
    }
    Duration::from_millis(rand::thread_rng().gen_range(range.clone()))
}

/// Background task extending a message's visibility every `interval` until stopped.
pub(crate) struct LeaseRenewer {
    stop: CancellationToken,
    handle: JoinHandle<u64>,
    _guard: DropGuard,
}

impl LeaseRenewer {
    pub(crate) fn spawn(
        queue: Arc<dyn MessageQueue>,
        receipt_handle: String,
        config: &PollerConfig,
        parent: &CancellationToken,
    ) -> Self {
        let stop = parent.child_token();
        let interval = config.renew_interval;
        let timeout = config.visibility_timeout;

        let handle = {
            let stop = stop.clone();
            tokio::spawn(
                async move {
                    let mut renewals = 0;
                    loop {
                        tokio::select! {
                            biased;
                            _ = stop.cancelled() => break,
                            _ = tokio::time::sleep(interval) => {}
                        }
                        match queue.change_visibility(&receipt_handle, timeout).await {
                            Ok(()) => {
                                renewals += 1;
                                metrics::lease_renewals().add(1, &[]);
                                info!(?timeout, renewals, "visibility timeout extended");
                            }
                            Err(e) => warn!(error = %e, "failed to extend visibility timeout"),
                        }
                    }
                    renewals
                }
                .in_current_span(),
            )
        };

        Self {
            _guard: stop.clone().drop_guard(),
            stop,
            handle,
        }
    }

    /// Stop renewing and wait for the task, so no extension is issued afterwards.
    /// Returns how many extensions were made.
    pub(crate) async fn stop(self) -> u64 {
        let LeaseRenewer {
            stop,
            handle,
            _guard,
        } = self;
        stop.cancel();
        match handle.await {
            Ok(renewals) => renewals,
            Err(e) => {
                warn!("lease renewer task failed: {e}");
                0
            }
        }
    }
}
