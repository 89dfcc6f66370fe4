//! Integration tests for the job queue actor.

use async_trait::async_trait;
use jobq::engine::{CountingProcessor, JobProcessManager, JobProcessor, JobQueueConfig, Processor};
use jobq::error::{Error, Result};
use jobq::model::job::{MessageId, WorkInput, WorkResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Counts completed calls after sleeping `latency`.
struct Slow {
    latency: Duration,
    done: Arc<AtomicUsize>,
}

#[async_trait]
impl Processor for Slow {
    async fn process(&self, input: WorkInput) -> Result<WorkResult> {
        tokio::time::sleep(self.latency).await;
        self.done.fetch_add(1, Ordering::SeqCst);
        Ok(WorkResult {
            result_data: format!("slow {}", input.input_data),
        })
    }
}

/// Blocks each call until a permit is available.
struct Gated {
    gate: Arc<Semaphore>,
    done: Arc<AtomicUsize>,
}

#[async_trait]
impl Processor for Gated {
    async fn process(&self, input: WorkInput) -> Result<WorkResult> {
        self.gate
            .acquire()
            .await
            .map_err(|e| Error::Other(e.to_string()))?
            .forget();
        self.done.fetch_add(1, Ordering::SeqCst);
        Ok(WorkResult {
            result_data: input.input_data.to_string(),
        })
    }
}

struct Panicking;

#[async_trait]
impl Processor for Panicking {
    async fn process(&self, input: WorkInput) -> Result<WorkResult> {
        if input.input_data < 0 {
            panic!("negative input");
        }
        Ok(WorkResult {
            result_data: "fine".to_string(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_sync_jobs_all_resolve() {
    let jobs = Arc::new(JobProcessManager::start(
        JobQueueConfig::default(),
        Arc::new(JobProcessor::new("jobProcessor-0").with_latency(10..50)),
    ));

    let mut handles = Vec::new();
    for n in 0..20 {
        let jobs = Arc::clone(&jobs);
        handles.push(tokio::spawn(async move {
            jobs.submit_sync(MessageId(n), WorkInput::new(i64::from(n)), Duration::from_secs(5))
                .await
        }));
    }
    for (n, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(
            result.result_data,
            format!("jobProcessor-0, inputData: {n}")
        );
    }
    jobs.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sync_timeout_leaves_job_running() {
    let done = Arc::new(AtomicUsize::new(0));
    let jobs = JobProcessManager::start(
        JobQueueConfig::default(),
        Arc::new(Slow {
            latency: Duration::from_millis(150),
            done: Arc::clone(&done),
        }),
    );

    let err = jobs
        .submit_sync(MessageId(1), WorkInput::new(1), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(done.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(done.load(Ordering::SeqCst), 1, "job completed after the wait gave up");
    jobs.shutdown().await;
}

#[tokio::test]
async fn counting_processor_fails_until_multiple() {
    let jobs = JobProcessManager::start(
        JobQueueConfig::default(),
        Arc::new(CountingProcessor::new(3)),
    );

    let mut outcomes = Vec::new();
    for n in 0..3 {
        outcomes.push(
            jobs.submit_sync(MessageId(n), WorkInput::new(7), Duration::from_secs(1))
                .await,
        );
    }

    let failures: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            Err(Error::Processing(cause)) => Some(cause.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        failures,
        vec![
            "count 1 is not a multiple of 3".to_string(),
            "count 2 is not a multiple of 3".to_string(),
        ]
    );
    assert_eq!(
        outcomes[2].as_ref().unwrap().result_data,
        "count: 3, inputData: 7"
    );
    jobs.shutdown().await;
}

#[tokio::test]
async fn panicking_processor_still_resolves_reply() {
    let jobs = JobProcessManager::start(
        JobQueueConfig {
            capacity: 2,
            parallelism: 1,
        },
        Arc::new(Panicking),
    );

    let err = jobs
        .submit_sync(MessageId(1), WorkInput::new(-1), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("panicked"), "got {err}");

    // The single worker survived the panic.
    let ok = jobs
        .submit_sync(MessageId(2), WorkInput::new(1), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(ok.result_data, "fine");
    jobs.shutdown().await;
}

#[tokio::test]
async fn failed_fire_and_forget_does_not_stop_worker() {
    let jobs = JobProcessManager::start(
        JobQueueConfig {
            capacity: 2,
            parallelism: 1,
        },
        Arc::new(CountingProcessor::new(2)),
    );

    jobs.submit_async(MessageId(1), WorkInput::new(1)).await.unwrap();
    let result = jobs
        .submit_sync(MessageId(2), WorkInput::new(2), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(result.result_data, "count: 2, inputData: 2");
    jobs.shutdown().await;
}

#[tokio::test]
async fn full_mailbox_suspends_submitters() {
    let gate = Arc::new(Semaphore::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    let jobs = JobProcessManager::start(
        JobQueueConfig {
            capacity: 1,
            parallelism: 2,
        },
        Arc::new(Gated {
            gate: Arc::clone(&gate),
            done: Arc::clone(&done),
        }),
    );

    // Two jobs held by the workers, one waiting in the mailbox.
    for n in 0..3 {
        tokio::time::timeout(
            Duration::from_secs(1),
            jobs.submit_async(MessageId(n), WorkInput::new(i64::from(n))),
        )
        .await
        .expect("mailbox had room")
        .unwrap();
        tokio::task::yield_now().await;
    }
    let blocked = tokio::time::timeout(
        Duration::from_millis(100),
        jobs.submit_async(MessageId(3), WorkInput::new(3)),
    )
    .await;
    assert!(blocked.is_err(), "fourth submit should wait for room");

    gate.add_permits(5);
    jobs.submit_async(MessageId(3), WorkInput::new(3)).await.unwrap();
    jobs.submit_async(MessageId(4), WorkInput::new(4)).await.unwrap();
    jobs.shutdown().await;
    assert_eq!(done.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn closed_queue_rejects_submissions() {
    let jobs = JobProcessManager::start(
        JobQueueConfig::default(),
        Arc::new(CountingProcessor::new(1)),
    );
    jobs.close();

    assert!(matches!(
        jobs.submit_async(MessageId(1), WorkInput::new(1)).await,
        Err(Error::Closed)
    ));
    assert!(matches!(
        jobs.submit_sync(MessageId(2), WorkInput::new(2), Duration::from_secs(1))
            .await,
        Err(Error::Closed)
    ));
    jobs.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_drains_queued_jobs() {
    let done = Arc::new(AtomicUsize::new(0));
    let jobs = JobProcessManager::start(
        JobQueueConfig {
            capacity: 10,
            parallelism: 2,
        },
        Arc::new(Slow {
            latency: Duration::from_millis(20),
            done: Arc::clone(&done),
        }),
    );

    for n in 0..8 {
        jobs.submit_async(MessageId(n), WorkInput::new(i64::from(n)))
            .await
            .unwrap();
    }
    jobs.shutdown().await;
    assert_eq!(done.load(Ordering::SeqCst), 8);
}

#[test]
fn zero_sizes_are_clamped() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let jobs = JobProcessManager::start(
            JobQueueConfig {
                capacity: 0,
                parallelism: 0,
            },
            Arc::new(CountingProcessor::new(1)),
        );
        assert_eq!(
            jobs.config(),
            &JobQueueConfig {
                capacity: 1,
                parallelism: 1
            }
        );
        jobs.shutdown().await;
    });
}
