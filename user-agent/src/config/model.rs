// src/config/model.rs

use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};
use thiserror::Error;

use devcore::kernel::SIM_GPIO_LINES;

/// Top-level runtime config
#[derive(Debug)]
pub struct Config {
    pub logging:  LoggingConfig,
    pub kernel:   KernelConfig,
    pub modules:  Vec<ModuleEntry>,
    pub scenario: ScenarioConfig,
}

/// Mirror of the whole TOML file, before durations are parsed
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    #[serde(default)]                  pub logging:  LoggingConfig,
    #[serde(default)]                  pub kernel:   KernelConfig,
    #[serde(default, rename = "module")] pub modules: Vec<ModuleEntry>,
    #[serde(default)]                  pub scenario: ScenarioStub,
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

/// Mirror of the `[kernel]` table
#[derive(Debug, Clone, Deserialize)]
pub struct KernelConfig {
    #[serde(default = "default_gpio_lines")] pub gpio_lines: u32,
}
fn default_gpio_lines() -> u32 { SIM_GPIO_LINES }

impl Default for KernelConfig {
    fn default() -> Self {
        Self { gpio_lines: default_gpio_lines() }
    }
}

/// One `[[module]]` entry: which sample to load and its parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Holds the raw `[scenario]` strings from TOML
#[derive(Debug, Default, Deserialize)]
pub struct ScenarioStub {
    #[serde(default)] pub poll_timeout:   Option<String>,
    #[serde(default)] pub signal_timeout: Option<String>,
}

/// Fully-typed scenario limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioConfig {
    pub poll_timeout:   Duration,
    pub signal_timeout: Duration,
}

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);
/// One full period of the signals sample, plus slack.
pub const DEFAULT_SIGNAL_TIMEOUT: Duration = Duration::from_secs(10);

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            poll_timeout:   DEFAULT_POLL_TIMEOUT,
            signal_timeout: DEFAULT_SIGNAL_TIMEOUT,
        }
    }
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("gpio_lines must be at least 1")]
    NoGpioLines,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
