//! Integration tests for configuration loading.
//!
//! Key responsibilities:
//! - Load a complete file from disk and check every table.
//! - Confirm defaults for absent tables and keys.
//! - Reject unknown modules and malformed durations.

use std::io::Write;
use std::time::Duration;

use agent::config::{self, ConfigError};
use agent::config::model::{DEFAULT_POLL_TIMEOUT, DEFAULT_SIGNAL_TIMEOUT};
use tempfile::NamedTempFile;

const FULL: &str = r#"
[logging]
enable = true
file = "drivers.log"
level = "debug"

[kernel]
gpio_lines = 40

[[module]]
name = "signals"
params = { sleep_ms = "250" }

[[module]]
name = "poll"

[scenario]
poll_timeout = "250ms"
signal_timeout = "2s"
"#;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn full_file_loads_every_table() {
    let file = write_temp(FULL);
    let cfg = config::load(file.path()).unwrap();

    assert!(cfg.logging.enable);
    assert_eq!(cfg.logging.file.as_deref(), Some("drivers.log"));
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.kernel.gpio_lines, 40);

    let names: Vec<_> = cfg.modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["signals", "poll"]);
    assert_eq!(cfg.modules[0].params.get("sleep_ms").map(String::as_str), Some("250"));
    assert!(cfg.modules[1].params.is_empty());

    assert_eq!(cfg.scenario.poll_timeout, Duration::from_millis(250));
    assert_eq!(cfg.scenario.signal_timeout, Duration::from_secs(2));
}

#[test]
fn empty_file_takes_defaults() {
    let cfg = config::parse("").unwrap();
    assert!(!cfg.logging.enable);
    assert_eq!(cfg.logging.level, "INFO");
    assert_eq!(cfg.kernel.gpio_lines, 28);
    assert!(cfg.modules.is_empty());
    assert_eq!(cfg.scenario.poll_timeout, DEFAULT_POLL_TIMEOUT);
    assert_eq!(cfg.scenario.signal_timeout, DEFAULT_SIGNAL_TIMEOUT);
}

#[test]
fn unknown_module_is_rejected() {
    let err = config::parse("[[module]]\nname = \"dma\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::UnknownModule(ref name) if name == "dma"));
}

#[test]
fn malformed_duration_is_rejected() {
    let err = config::parse("[scenario]\npoll_timeout = \"soonish\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDuration(ref raw, _) if raw == "soonish"));
}

#[test]
fn zero_gpio_lines_is_rejected() {
    let err = config::parse("[kernel]\ngpio_lines = 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::NoGpioLines));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = config::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn shipped_default_config_parses() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("default.toml");
    let cfg = config::load(&path).unwrap();
    assert!(cfg.modules.iter().any(|m| m.name == "ioctl"));
}
