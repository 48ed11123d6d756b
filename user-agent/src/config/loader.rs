// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads `default.toml`, deserializes into `RawConfig`, and
//! converts it into a runtime `Config` with parsed durations.

use crate::config::model::{
    Config, ConfigError, RawConfig, ScenarioConfig, ScenarioStub,
};
use log::Level;
use std::{fs, path::Path, time::Duration};

/// Load and parse the configuration at `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    agent_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt)?;
    agent_log!(
        Level::Info,
        "config",
        "Loaded config from {:?}: {} module(s)",
        path,
        cfg.modules.len()
    );
    Ok(cfg)
}

/// Parse configuration text. Module names are checked against the
/// samples the driver crate ships.
pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(txt)?;

    if raw.kernel.gpio_lines == 0 {
        return Err(ConfigError::NoGpioLines);
    }
    if let Some(unknown) = raw
        .modules
        .iter()
        .find(|m| !devcore::samples::names().any(|n| n == m.name))
    {
        return Err(ConfigError::UnknownModule(unknown.name.clone()));
    }

    Ok(Config {
        logging:  raw.logging,
        kernel:   raw.kernel,
        modules:  raw.modules,
        scenario: convert_scenario(raw.scenario)?,
    })
}

/// Convert the raw `[scenario]` strings, keeping defaults for absent keys.
fn convert_scenario(stub: ScenarioStub) -> Result<ScenarioConfig, ConfigError> {
    let defaults = ScenarioConfig::default();
    Ok(ScenarioConfig {
        poll_timeout:   duration(stub.poll_timeout, defaults.poll_timeout)?,
        signal_timeout: duration(stub.signal_timeout, defaults.signal_timeout)?,
    })
}

fn duration(raw: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    match raw {
        None => Ok(default),
        Some(s) => humantime::parse_duration(&s).map_err(|e| ConfigError::InvalidDuration(s, e)),
    }
}
