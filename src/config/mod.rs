//! Typed configuration from environment variables.
//!
//! Loads once at startup. Sensitive values are wrapped in
//! secrecy::SecretString to prevent log leaks. Component tuning
//! (mailbox size, fan-out width, lease timings) lives in [`tuning`].

pub mod secrets;
pub mod tuning;

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Config {
    /// Postgres URL for the pgmq-backed queue. Not needed with `--local`.
    pub database_url: Option<SecretString>,
    /// Base URL of the downstream API that receives each payload line.
    pub api_url: String,
    pub api_token: Option<SecretString>,
    /// Root directory of the filesystem blob store.
    pub blob_dir: PathBuf,
    pub queue_name: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let queue_name = var_or("QUEUE_NAME", "jobq");
        if queue_name.is_empty()
            || !queue_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Config(format!(
                "QUEUE_NAME must be non-empty and contain only [A-Za-z0-9_], got {queue_name:?}"
            )));
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok().map(SecretString::from),
            api_url: var_or("API_URL", "https://httpbin.org"),
            api_token: std::env::var("API_TOKEN").ok().map(SecretString::from),
            blob_dir: PathBuf::from(var_or("BLOB_DIR", "./blobs")),
            queue_name,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }

    /// The database URL, failing fast when pgmq mode is requested without one.
    pub fn require_database_url(&self) -> Result<&SecretString> {
        self.database_url.as_ref().ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
