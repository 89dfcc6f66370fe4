//! Optional TOML tuning file.
//!
//! ```toml
//! [job]
//! capacity = 10
//! parallelism = 2
//!
//! [poller]
//! interval_ms = 500
//! backoff_secs = 60
//! consumers = 3
//! renew_interval_secs = 20
//! visibility_timeout_secs = 30
//!
//! [shutdown]
//! timeout_secs = 25
//! ```
//!
//! Every key is optional; missing keys keep the component defaults.

use crate::engine::JobQueueConfig;
use crate::error::{Error, Result};
use crate::poller::{PollerConfig, ShutdownConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tuning {
    pub job: JobSection,
    pub poller: PollerSection,
    pub shutdown: ShutdownSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobSection {
    pub capacity: Option<usize>,
    pub parallelism: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollerSection {
    pub interval_ms: Option<u64>,
    pub backoff_secs: Option<u64>,
    pub max_messages: Option<usize>,
    pub channel_capacity: Option<usize>,
    pub consumers: Option<usize>,
    pub renew_interval_secs: Option<u64>,
    pub visibility_timeout_secs: Option<u64>,
    pub call_delay_min_ms: Option<u64>,
    pub call_delay_max_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownSection {
    pub timeout_secs: Option<u64>,
    pub check_interval_ms: Option<u64>,
    pub grace_ms: Option<u64>,
}

impl Tuning {
    /// Read and validate a tuning file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read tuning file {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("bad tuning file {}: {e}", path.display())))
    }

    /// Parse tuning from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let tuning: Tuning =
            toml::from_str(content).map_err(|e| Error::Config(e.message().to_string()))?;
        tuning.validate()?;
        Ok(tuning)
    }

    fn validate(&self) -> Result<()> {
        let positive = [
            ("job.capacity", self.job.capacity),
            ("job.parallelism", self.job.parallelism),
        ];
        for (key, value) in positive {
            if value == Some(0) {
                return Err(Error::Config(format!("{key} must be greater than zero")));
            }
        }
        self.poller_config().validate()?;
        self.shutdown_config().validate()
    }

    pub fn job_config(&self) -> JobQueueConfig {
        let defaults = JobQueueConfig::default();
        JobQueueConfig {
            capacity: self.job.capacity.unwrap_or(defaults.capacity),
            parallelism: self.job.parallelism.unwrap_or(defaults.parallelism),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        let d = PollerConfig::default();
        let p = &self.poller;
        PollerConfig {
            interval: p.interval_ms.map(Duration::from_millis).unwrap_or(d.interval),
            backoff: p.backoff_secs.map(Duration::from_secs).unwrap_or(d.backoff),
            max_messages: p.max_messages.unwrap_or(d.max_messages),
            channel_capacity: p.channel_capacity.unwrap_or(d.channel_capacity),
            consumers: p.consumers.unwrap_or(d.consumers),
            renew_interval: p
                .renew_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(d.renew_interval),
            visibility_timeout: p
                .visibility_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(d.visibility_timeout),
            call_delay: p.call_delay_min_ms.unwrap_or(d.call_delay.start)
                ..p.call_delay_max_ms.unwrap_or(d.call_delay.end),
        }
    }

    pub fn shutdown_config(&self) -> ShutdownConfig {
        let d = ShutdownConfig::default();
        let s = &self.shutdown;
        ShutdownConfig {
            timeout: s.timeout_secs.map(Duration::from_secs).unwrap_or(d.timeout),
            check_interval: s
                .check_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(d.check_interval),
            grace: s.grace_ms.map(Duration::from_millis).unwrap_or(d.grace),
        }
    }
}
