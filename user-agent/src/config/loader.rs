// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads `default.toml`, deserializes into the raw mirror structs, and
//! converts them into the fully-typed runtime [`Config`].

use crate::config::model::{
    Config, ConfigError, ModuleRange, MonitorConfig, MonitorMode, MonitorStub, RawConfig, TableConfig,
    TableStub,
};
use std::{fs, path::Path, time::Duration};

/// Interval used by `watch` mode when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Load and parse the configuration at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    log::debug!("Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt)?;
    log::info!("Loaded config from {:?}", path);
    Ok(cfg)
}

/// Parse configuration text.
pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(txt)?;
    Ok(Config {
        logging: raw.logging,
        device:  raw.device.into_device_config(),
        monitor: convert_monitor(raw.monitor)?,
        table:   convert_table(raw.table)?,
    })
}

fn convert_monitor(stub: MonitorStub) -> Result<MonitorConfig, ConfigError> {
    let mode: MonitorMode = stub.mode.parse()?;
    let interval = match stub.interval {
        Some(s) => humantime::parse_duration(&s).map_err(|e| ConfigError::InvalidDuration(s, e))?,
        None => DEFAULT_INTERVAL,
    };
    Ok(MonitorConfig {
        mode,
        interval,
        max_passes: stub.max_passes,
        auto_unhook: stub.auto_unhook,
        buffer_size: stub.buffer_size,
    })
}

fn convert_table(stub: TableStub) -> Result<TableConfig, ConfigError> {
    if stub.baseline.len() != stub.current.len() {
        return Err(ConfigError::TableMismatch {
            baseline: stub.baseline.len(),
            current:  stub.current.len(),
        });
    }

    let baseline = stub.baseline.iter().map(|a| a.resolve()).collect::<Result<Vec<_>, _>>()?;
    let current = stub.current.iter().map(|a| a.resolve()).collect::<Result<Vec<_>, _>>()?;
    let modules = stub
        .modules
        .into_iter()
        .map(|m| {
            Ok(ModuleRange {
                base: m.base.resolve()?,
                size: usize::try_from(m.size).map_err(|_| ConfigError::InvalidAddress(m.size.to_string()))?,
                name: m.name,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    log::debug!("Converted table: {} slot(s), {} module(s)", baseline.len(), modules.len());
    Ok(TableConfig { baseline, current, modules })
}
