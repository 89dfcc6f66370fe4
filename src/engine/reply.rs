//! Single-assignment reply handle for request/reply submissions.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

type Slot<T> = Option<std::result::Result<T, String>>;

/// A cell resolved exactly once with a value or a failure cause.
///
/// Clones share the same cell. Every waiter observes the same outcome,
/// and a second resolution is rejected rather than overwriting the first.
#[derive(Debug)]
pub struct ReplyHandle<T> {
    slot: Arc<watch::Sender<Slot<T>>>,
}

impl<T> Clone for ReplyHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> Default for ReplyHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ReplyHandle<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { slot: Arc::new(tx) }
    }

    /// Resolve with a success value.
    pub fn complete(&self, value: T) -> Result<()> {
        self.resolve(Ok(value))
    }

    /// Resolve with the message text of a failure.
    pub fn fail(&self, cause: impl Into<String>) -> Result<()> {
        self.resolve(Err(cause.into()))
    }

    /// Store the outcome unless one is already present.
    pub fn resolve(&self, outcome: std::result::Result<T, String>) -> Result<()> {
        let mut outcome = Some(outcome);
        let stored = self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        });
        if stored {
            Ok(())
        } else {
            Err(Error::AlreadyResolved)
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait for the outcome, giving up after `timeout`.
    ///
    /// Timing out only stops this waiter; whoever holds the other clone
    /// keeps running and may still resolve the handle.
    pub async fn wait(&self, timeout: Duration) -> Result<T> {
        let mut rx = self.slot.subscribe();
        let slot = tokio::time::timeout(timeout, rx.wait_for(Option::is_some))
            .await
            .map_err(|_| Error::Timeout(timeout))?
            .map_err(|_| Error::Other("reply handle dropped".to_string()))?;
        match slot.as_ref() {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(cause)) => Err(Error::Processing(cause.clone())),
            None => Err(Error::Other("reply handle observed empty".to_string())),
        }
    }
}
