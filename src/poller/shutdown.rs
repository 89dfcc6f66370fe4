//! Waits for an in-flight poll before the process stops, cancelling it
//! when it takes too long.

use super::QueuePoller;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Configuration for shutdown coordination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownConfig {
    /// Bound on each wait for the poller to go idle.
    pub timeout: Duration,
    /// How often the processing flag is checked.
    pub check_interval: Duration,
    /// Pause after escalating, before reporting back.
    pub grace: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(25),
            check_interval: Duration::from_secs(1),
            grace: Duration::from_secs(1),
        }
    }
}

impl ShutdownConfig {
    /// A zero `check_interval` would spin on the processing flag.
    pub fn validate(&self) -> Result<()> {
        if self.check_interval.is_zero() {
            return Err(Error::Config(
                "shutdown.check_interval must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config(
                "shutdown.timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the shutdown wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The poller went idle within the first wait.
    Idle,
    /// The poll was cancelled and then went idle.
    DrainedAfterCancel,
    /// Still processing after cancelling and waiting again.
    GaveUp,
}

pub struct ShutdownListener {
    poller: Arc<QueuePoller>,
    config: ShutdownConfig,
}

impl ShutdownListener {
    pub fn new(poller: Arc<QueuePoller>, config: ShutdownConfig) -> Self {
        Self { poller, config }
    }

    /// Block until the poller is idle, escalating to cancellation after `timeout`.
    pub async fn wait(&self) -> ShutdownOutcome {
        info!(processing = self.poller.is_processing(), "waiting for poller");
        if wait_idle(&self.poller, &self.config).await {
            info!("poller idle");
            return ShutdownOutcome::Idle;
        }

        info!(timeout = ?self.config.timeout, "poller still busy, cancelling");
        // Runs on its own task: dropping this future does not abort the second wait.
        let escalation = tokio::spawn({
            let poller = Arc::clone(&self.poller);
            let config = self.config.clone();
            async move {
                poller.cancel();
                let drained = wait_idle(&poller, &config).await;
                tokio::time::sleep(config.grace).await;
                drained
            }
        });

        match escalation.await {
            Ok(true) => {
                info!(processing = self.poller.is_processing(), "poller drained after cancel");
                ShutdownOutcome::DrainedAfterCancel
            }
            Ok(false) => {
                warn!("poller did not stop after cancel, giving up");
                ShutdownOutcome::GaveUp
            }
            Err(e) => {
                error!("shutdown escalation task failed: {e}");
                ShutdownOutcome::GaveUp
            }
        }
    }
}

/// Poll the processing flag every `check_interval` for at most `timeout`.
async fn wait_idle(poller: &QueuePoller, config: &ShutdownConfig) -> bool {
    tokio::time::timeout(config.timeout, async {
        while poller.is_processing() {
            tokio::time::sleep(config.check_interval).await;
            debug!(processing = poller.is_processing(), "checked poller");
        }
    })
    .await
    .is_ok()
}
