// src/config/model.rs

use serde::Deserialize;
use std::{str::FromStr, time::Duration};
use thiserror::Error;
use unhooker_driver::{Address, DeviceConfig, WorkerConfig};

/// Top-level runtime config
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub device:  DeviceConfig,
    pub monitor: MonitorConfig,
    pub table:   TableConfig,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]            pub enable: bool,
    #[serde(default)]            pub file:   Option<String>,
    #[serde(default = "default_level")] pub level: String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Mirror of the `[device]` table
#[derive(Debug, Default, Deserialize)]
pub struct DeviceStub {
    #[serde(default)] pub worker_name:       Option<String>,
    #[serde(default)] pub worker_stack_size: Option<usize>,
    #[serde(default)] pub unknown_module:    Option<String>,
}

/// Mirror of the `[monitor]` table
#[derive(Debug, Deserialize)]
pub struct MonitorStub {
    #[serde(default = "default_mode")]        pub mode:        String,
    #[serde(default)]                         pub interval:    Option<String>,
    #[serde(default)]                         pub max_passes:  u64,
    #[serde(default)]                         pub auto_unhook: bool,
    #[serde(default = "default_buffer_size")] pub buffer_size: usize,
}
fn default_mode() -> String { "once".into() }
fn default_buffer_size() -> usize { 4096 }

impl Default for MonitorStub {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            interval: None,
            max_passes: 0,
            auto_unhook: false,
            buffer_size: default_buffer_size(),
        }
    }
}

/// An address written either as a TOML integer or as a hex string
/// (`"0xfffff80312345678"`), since kernel addresses overflow TOML's i64.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAddress {
    Int(u64),
    Text(String),
}

/// Holds the raw `[[table.modules]]` entries from TOML
#[derive(Debug, Deserialize)]
pub struct ModuleStub {
    pub base: RawAddress,
    pub size: u64,
    pub name: String,
}

/// Mirror of the `[table]` table: the simulated service table
#[derive(Debug, Default, Deserialize)]
pub struct TableStub {
    #[serde(default)] pub baseline: Vec<RawAddress>,
    #[serde(default)] pub current:  Vec<RawAddress>,
    #[serde(default)] pub modules:  Vec<ModuleStub>,
}

/// Whole file as deserialized from TOML
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)] pub logging: LoggingConfig,
    #[serde(default)] pub device:  DeviceStub,
    #[serde(default)] pub monitor: MonitorStub,
    #[serde(default)] pub table:   TableStub,
}

/// How many passes the monitor makes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    Once,
    Watch,
}

/// Fully-typed `[monitor]` section
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub mode:        MonitorMode,
    pub interval:    Duration,
    /// 0 = unbounded
    pub max_passes:  u64,
    pub auto_unhook: bool,
    pub buffer_size: usize,
}

/// A module the simulated resolver knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRange {
    pub base: Address,
    pub size: usize,
    pub name: String,
}

/// Fully-typed `[table]` section
#[derive(Debug, Clone, Default)]
pub struct TableConfig {
    pub baseline: Vec<Address>,
    pub current:  Vec<Address>,
    pub modules:  Vec<ModuleRange>,
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid monitor mode '{0}'")]
    InvalidMode(String),

    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("table has {baseline} baseline value(s) but {current} current value(s)")]
    TableMismatch { baseline: usize, current: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Allow `"watch"` → `MonitorMode::Watch`
impl FromStr for MonitorMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "once"  => Ok(MonitorMode::Once),
            "watch" => Ok(MonitorMode::Watch),
            other   => Err(ConfigError::InvalidMode(other.into())),
        }
    }
}

impl RawAddress {
    pub fn resolve(&self) -> Result<Address, ConfigError> {
        let value = match self {
            RawAddress::Int(v) => Some(*v),
            RawAddress::Text(s) => {
                let t = s.trim();
                t.strip_prefix("0x")
                    .or_else(|| t.strip_prefix("0X"))
                    .map_or_else(|| t.parse().ok(), |hex| u64::from_str_radix(&hex.replace('_', ""), 16).ok())
            }
        };
        value
            .and_then(|v| Address::try_from(v).ok())
            .ok_or_else(|| ConfigError::InvalidAddress(self.to_string()))
    }
}

impl std::fmt::Display for RawAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawAddress::Int(v)  => write!(f, "{}", v),
            RawAddress::Text(s) => f.write_str(s),
        }
    }
}

impl DeviceStub {
    pub fn into_device_config(self) -> DeviceConfig {
        let defaults = DeviceConfig::default();
        DeviceConfig {
            worker: WorkerConfig {
                thread_name: self.worker_name.unwrap_or(defaults.worker.thread_name),
                stack_size: self.worker_stack_size.or(defaults.worker.stack_size),
            },
            unknown_module: self.unknown_module.unwrap_or(defaults.unknown_module),
        }
    }
}
