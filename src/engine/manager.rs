//! Job queue actor: a bounded mailbox drained by a fixed pool of workers.

use super::processor::Processor;
use crate::error::{Error, Result};
use crate::model::job::{MessageId, ProcessMessage, WorkInput, WorkResult};
use crate::telemetry::metrics;
use crate::telemetry::spans::start_job_span;
use futures::FutureExt as _;
use opentelemetry::KeyValue;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};

type Mailbox = Arc<tokio::sync::Mutex<mpsc::Receiver<ProcessMessage>>>;

/// Configuration for the job queue. Read once at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQueueConfig {
    /// Mailbox capacity. Submitters suspend while it is full.
    pub capacity: usize,
    /// Number of worker loops pulling from the mailbox.
    pub parallelism: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            parallelism: 2,
        }
    }
}

/// Accepts jobs on a bounded mailbox and runs them on `parallelism` workers.
///
/// Fire-and-forget jobs report only an acknowledgment to the submitter;
/// request/reply jobs carry a [`ReplyHandle`](super::ReplyHandle) that the
/// worker resolves exactly once.
pub struct JobProcessManager {
    sender: Mutex<Option<mpsc::Sender<ProcessMessage>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: JobQueueConfig,
}

impl JobProcessManager {
    /// Open the mailbox and spawn the workers. Must run inside a Tokio runtime.
    pub fn start(config: JobQueueConfig, processor: Arc<dyn Processor>) -> Self {
        let config = JobQueueConfig {
            capacity: config.capacity.max(1),
            parallelism: config.parallelism.max(1),
        };
        info!(
            capacity = config.capacity,
            parallelism = config.parallelism,
            "starting job queue"
        );

        let (tx, rx) = mpsc::channel(config.capacity);
        let mailbox: Mailbox = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..config.parallelism)
            .map(|worker| {
                let mailbox = Arc::clone(&mailbox);
                let processor = Arc::clone(&processor);
                tokio::spawn(worker_loop(worker, mailbox, processor))
            })
            .collect();

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            config,
        }
    }

    pub fn config(&self) -> &JobQueueConfig {
        &self.config
    }

    /// Enqueue a message, suspending while the mailbox is full.
    ///
    /// Fails with [`Error::Closed`] once [`close`](Self::close) has been called.
    pub async fn submit(&self, message: ProcessMessage) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| Error::Other("job queue sender lock poisoned".to_string()))?
            .clone()
            .ok_or(Error::Closed)?;

        let kind = message.kind();
        info!(id = %message.id(), kind, "submitting job");
        sender.send(message).await.map_err(|_| Error::Closed)?;
        metrics::jobs_submitted().add(1, &[KeyValue::new("kind", kind)]);
        Ok(())
    }

    /// Enqueue a job without waiting for its result.
    pub async fn submit_async(&self, id: MessageId, input: WorkInput) -> Result<()> {
        self.submit(ProcessMessage::fire_and_forget(id, input)).await
    }

    /// Enqueue a job and wait up to `timeout` for its result.
    ///
    /// On timeout the job keeps running; only the wait is abandoned.
    pub async fn submit_sync(
        &self,
        id: MessageId,
        input: WorkInput,
        timeout: Duration,
    ) -> Result<WorkResult> {
        let (message, reply) = ProcessMessage::request_reply(id, input);
        self.submit(message).await?;
        let result = reply.wait(timeout).await;
        if let Err(ref e) = result {
            info!(%id, error = %e, timed_out = e.is_timeout(), "sync job did not succeed");
        }
        result
    }

    /// Stop accepting submissions. Workers drain what is already queued.
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            if sender.take().is_some() {
                info!("job queue closed");
            }
        }
    }

    /// Close the mailbox and wait for every worker to drain and exit.
    pub async fn shutdown(&self) {
        self.close();
        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => return,
        };
        for handle in workers {
            if let Err(e) = handle.await {
                error!("job worker ended abnormally: {e}");
            }
        }
        info!("job queue drained");
    }
}

async fn worker_loop(worker: usize, mailbox: Mailbox, processor: Arc<dyn Processor>) {
    info!(worker, "job worker started");
    loop {
        // Guard released before processing so other workers can receive.
        let message = mailbox.lock().await.recv().await;
        let Some(message) = message else {
            break;
        };
        dispatch(worker, processor.as_ref(), message).await;
    }
    info!(worker, "job worker finished");
}

async fn dispatch(worker: usize, processor: &dyn Processor, message: ProcessMessage) {
    let kind = message.kind();
    let span = start_job_span(kind, message.id(), worker);

    async {
        let started = Instant::now();
        let succeeded = match message {
            ProcessMessage::FireAndForget { id, input } => match run(processor, input).await {
                Ok(result) => {
                    info!(%id, %result, "job completed");
                    true
                }
                Err(e) => {
                    warn!(%id, error = %e, "fire-and-forget job failed");
                    false
                }
            },
            ProcessMessage::RequestReply { id, input, reply } => {
                let outcome = run(processor, input).await.map_err(|e| e.to_string());
                let succeeded = outcome.is_ok();
                if reply.resolve(outcome).is_err() {
                    warn!(%id, "reply handle was already resolved");
                }
                succeeded
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        metrics::jobs_processed().add(
            1,
            &[
                KeyValue::new("kind", kind),
                KeyValue::new("result", if succeeded { "ok" } else { "error" }),
            ],
        );
        metrics::operation_duration_ms().record(elapsed_ms, &[KeyValue::new("operation", kind)]);
    }
    .instrument(span)
    .await
}

/// Run the processor, turning a panic into a processing failure.
async fn run(processor: &dyn Processor, input: WorkInput) -> Result<WorkResult> {
    match AssertUnwindSafe(processor.process(input)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Error::Processing(format!("processor panicked: {reason}")))
        }
    }
}
