//! Configuration management for the bridge process.
//!
//! Sources are merged with increasing priority:
//! 1. Default values (hardcoded)
//! 2. `config/bridge.toml` (optional)
//! 3. Explicit config file passed by the caller
//! 4. File named by `CONFIG_PATH`
//! 5. Environment variables prefixed with `BRIDGE__`
//!

mod dispatch;
mod log;
mod monitoring;
mod retry;
mod store;
pub use dispatch::*;
pub use log::*;
pub use monitoring::*;
pub use retry::*;
pub use store::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    /// Log output and filter settings
    pub log: LogConfig,
    /// Defaults applied when opening store connections
    pub store: StoreConfig,
    /// Dispatch loop behaviour
    pub dispatch: DispatchConfig,
    /// Metrics exporter settings
    pub monitoring: MonitoringConfig,
}

impl Settings {
    /// Load configuration from all sources and validate the result.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to an explicit configuration file
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder()
            .add_source(File::with_name("config/bridge").required(false));

        if let Some(path) = config_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        if let Ok(path) = env::var("CONFIG_PATH") {
            config = config.add_source(File::with_name(&path).required(true));
        }

        // Environment variables (highest priority)
        config = config.add_source(
            Environment::with_prefix("BRIDGE")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.dispatch.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}
