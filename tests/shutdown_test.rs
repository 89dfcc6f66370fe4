//! Integration tests for shutdown coordination with an in-flight poll.

mod common;

use common::{Call, Journal, RecordingApi, RecordingQueue, test_config};
use jobq::external::{self, BlobStore, InMemoryBlobStore, MessageQueue};
use jobq::poller::{PollerConfig, QueuePoller, ShutdownConfig, ShutdownListener, ShutdownOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

async fn busy_poller(
    config: PollerConfig,
    api: RecordingApi,
    journal: &Arc<Journal>,
    last_line: u32,
) -> (Arc<QueuePoller>, JoinHandle<()>) {
    let queue = Arc::new(RecordingQueue::new(Arc::clone(journal)));
    let blobs = Arc::new(InMemoryBlobStore::new());
    external::seed(queue.as_ref(), blobs.as_ref(), "aaa/s3data.txt", last_line)
        .await
        .unwrap();

    let poller = Arc::new(QueuePoller::new(
        queue as Arc<dyn MessageQueue>,
        blobs as Arc<dyn BlobStore>,
        Arc::new(api),
        config,
    ));
    let tick = tokio::spawn({
        let poller = Arc::clone(&poller);
        async move { poller.tick().await }
    });
    // Let the poll lease its message before the listener starts.
    tokio::time::sleep(Duration::from_millis(5)).await;
    (poller, tick)
}

#[tokio::test(start_paused = true)]
async fn idle_poller_returns_at_once() {
    let journal = Arc::new(Journal::default());
    let poller = Arc::new(QueuePoller::new(
        Arc::new(RecordingQueue::new(Arc::clone(&journal))),
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(RecordingApi::new(Arc::clone(&journal))),
        test_config(),
    ));

    let started = Instant::now();
    let outcome = ShutdownListener::new(poller, ShutdownConfig::default())
        .wait()
        .await;

    assert_eq!(outcome, ShutdownOutcome::Idle);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn short_poll_finishes_and_deletes() {
    let journal = Arc::new(Journal::default());
    let api = RecordingApi::new(Arc::clone(&journal));
    let (poller, tick) = busy_poller(test_config(), api, &journal, 2).await;
    assert!(poller.is_processing());

    let outcome = ShutdownListener::new(Arc::clone(&poller), ShutdownConfig::default())
        .wait()
        .await;
    tick.await.unwrap();

    assert_eq!(outcome, ShutdownOutcome::Idle);
    assert_eq!(journal.count(&Call::Delete), 1);
    assert_eq!(journal.posts().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn long_poll_is_cancelled_then_drains() {
    let journal = Arc::new(Journal::default());
    let config = PollerConfig {
        call_delay: 100_000..100_001,
        ..test_config()
    };
    let api = RecordingApi::new(Arc::clone(&journal));
    let (poller, tick) = busy_poller(config, api, &journal, 20).await;

    let started = Instant::now();
    let outcome = ShutdownListener::new(Arc::clone(&poller), ShutdownConfig::default())
        .wait()
        .await;
    tick.await.unwrap();

    assert_eq!(outcome, ShutdownOutcome::DrainedAfterCancel);
    assert!(started.elapsed() >= Duration::from_secs(25));
    assert!(!poller.is_processing());
    assert_eq!(journal.count(&Call::Delete), 0, "cancelled poll keeps the message");
    assert!(journal.posts().len() < 21);
    assert!(poller.next_eligible().is_some());
}

#[tokio::test(start_paused = true)]
async fn uncancellable_call_makes_listener_give_up() {
    let journal = Arc::new(Journal::default());
    let api = RecordingApi::new(Arc::clone(&journal)).latency(Duration::from_secs(600));
    let (poller, tick) = busy_poller(test_config(), api, &journal, 20).await;

    let config = ShutdownConfig {
        timeout: Duration::from_secs(5),
        check_interval: Duration::from_millis(500),
        grace: Duration::from_millis(100),
    };
    let started = Instant::now();
    let outcome = ShutdownListener::new(Arc::clone(&poller), config)
        .wait()
        .await;

    assert_eq!(outcome, ShutdownOutcome::GaveUp);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(poller.is_processing(), "in-flight call still running");

    // The in-flight calls complete, then the cancelled poll winds down.
    tick.await.unwrap();
    assert!(!poller.is_processing());
    assert_eq!(journal.count(&Call::Delete), 0);
    assert_eq!(journal.posts().len(), 3);
}
