//! Error types for jobq.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The processor (or a downstream call) failed. Carries the failure message unchanged.
    #[error("{0}")]
    Processing(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("job queue is closed")]
    Closed,

    #[error("reply handle already resolved")]
    AlreadyResolved,

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the timed-out outcome of a synchronous submission.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
