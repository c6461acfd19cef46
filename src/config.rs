//! Configuration management.
//!
//! Built-in defaults sit under an optional TOML file, so a bare
//! `Settings::load(None)` always produces a runnable configuration and a
//! partial file only overrides what it names. Every duration accepts humantime
//! strings ("2s", "1ms").

use config::Config;
use serde::Deserialize;

use crate::error::{DaqError, DaqResult};
use crate::manager::ManagerConfig;
use crate::regulator::RegulatorConfig;
use crate::storage::StorageConfig;

/// Top-level settings tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default log filter applied when `RUST_LOG` is unset.
    pub log_level: String,
    pub manager: ManagerConfig,
    pub regulator: RegulatorConfig,
    pub storage: StorageConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            manager: ManagerConfig::default(),
            regulator: RegulatorConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Settings {
    /// Loads settings from `path` over the built-in defaults, then validates
    /// the result. With no path the defaults are returned directly.
    pub fn load(path: Option<&str>) -> DaqResult<Self> {
        let Some(path) = path else {
            let settings = Settings::default();
            settings.validate()?;
            return Ok(settings);
        };
        let s = Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .map_err(DaqError::Config)?;
        let settings: Settings = s.try_deserialize().map_err(DaqError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values that parse fine but cannot work at runtime.
    pub fn validate(&self) -> DaqResult<()> {
        if self.manager.poll_interval.is_zero() {
            return Err(DaqError::Configuration(
                "manager.poll_interval must be non-zero".to_string(),
            ));
        }
        if self.manager.rpc_deadline.is_zero() {
            return Err(DaqError::Configuration(
                "manager.rpc_deadline must be non-zero".to_string(),
            ));
        }
        if self.manager.sample_channel_capacity == 0 {
            return Err(DaqError::Configuration(
                "manager.sample_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.regulator.window_length == 0 {
            return Err(DaqError::Configuration(
                "regulator.window_length must be at least 1".to_string(),
            ));
        }
        if self.regulator.voltage_step <= 0.0 {
            return Err(DaqError::Configuration(
                "regulator.voltage_step must be positive".to_string(),
            ));
        }
        if self.regulator.bands.is_empty() {
            return Err(DaqError::Configuration(
                "regulator.bands must name at least one detection band".to_string(),
            ));
        }
        for band in &self.regulator.bands {
            if band.multiple <= 0.0 || band.threshold <= 0.0 {
                return Err(DaqError::Configuration(format!(
                    "regulator band at {}x must have positive multiple and threshold",
                    band.multiple
                )));
            }
        }
        if self.storage.queue_capacity == 0 {
            return Err(DaqError::Configuration(
                "storage.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
