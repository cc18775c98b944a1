use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// Directory for the log file. Logs go to stderr when unset,
    /// since stdout may carry the host protocol.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Log file name inside `dir`
    /// Default: "bridge.log"
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Default filter directive, overridden by `RUST_LOG`
    /// Default: "info"
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_name: default_file_name(),
            level: default_level(),
        }
    }
}

fn default_file_name() -> String {
    "bridge.log".to_string()
}

fn default_level() -> String {
    "info".to_string()
}
