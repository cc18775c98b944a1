use std::time::Duration;

use serde::Deserialize;

use super::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Defaults for store sessions. A connection config blob that sets the
/// matching field wins over these values.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Default: 5000
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    /// Per-request timeout, 0 disables it
    /// Default: 0
    #[serde(default)]
    pub request_timeout_ms: u64,

    /// HTTP/2 keep-alive ping interval, 0 disables keep-alive
    /// Default: 0
    #[serde(default)]
    pub keep_alive_interval_ms: u64,

    /// Default: 20000
    #[serde(default = "default_keep_alive_timeout_ms")]
    pub keep_alive_timeout_ms: u64,

    /// Retry policy used while opening a session
    #[serde(default)]
    pub connect_retry: BackoffPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dial_timeout_ms: default_dial_timeout_ms(),
            request_timeout_ms: 0,
            keep_alive_interval_ms: 0,
            keep_alive_timeout_ms: default_keep_alive_timeout_ms(),
            connect_retry: BackoffPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_retry.max_retries == 0 {
            return Err(Error::InvalidConfig(
                "store.connect_retry.max_retries must be at least 1".into(),
            ));
        }
        if self.connect_retry.timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "store.connect_retry.timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn keep_alive(&self) -> Option<(Duration, Duration)> {
        (self.keep_alive_interval_ms > 0).then(|| {
            (
                Duration::from_millis(self.keep_alive_interval_ms),
                Duration::from_millis(self.keep_alive_timeout_ms),
            )
        })
    }
}

fn default_dial_timeout_ms() -> u64 {
    5000
}

fn default_keep_alive_timeout_ms() -> u64 {
    20000
}
