use serde::Deserialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Terminate on a malformed envelope instead of failing only that task.
    /// Default: true
    #[serde(default = "default_strict_envelope")]
    pub strict_envelope: bool,

    /// Runtime worker threads used by spawned command handlers and forwarders
    /// Default: 2
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strict_envelope: default_strict_envelope(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::InvalidConfig(
                "dispatch.worker_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_strict_envelope() -> bool {
    true
}

fn default_worker_threads() -> usize {
    2
}
