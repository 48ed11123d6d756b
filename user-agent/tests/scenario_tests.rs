//! Integration tests for the scenario runners.
//!
//! Each test boots a host with the modules a scenario needs and runs it
//! the way `main` does.

use std::collections::BTreeMap;
use std::time::Duration;

use agent::config::{Config, ModuleEntry, ScenarioConfig};
use agent::config::model::{KernelConfig, LoggingConfig};
use agent::host::Host;
use agent::scenarios::{self, ECHO_PAYLOAD, GREETING, NEW_ANSWER};
use devcore::samples::ioctl::IoctlExample;
use devcore::EventKind;
use shared::constants::SIGNR;
use shared::poll::{POLLIN, POLLRDNORM};

fn module(name: &str, params: &[(&str, &str)]) -> ModuleEntry {
    ModuleEntry {
        name: name.to_owned(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn quick() -> ScenarioConfig {
    ScenarioConfig {
        poll_timeout: Duration::from_secs(5),
        signal_timeout: Duration::from_secs(5),
    }
}

fn boot(modules: &[ModuleEntry]) -> Host {
    Host::boot(&KernelConfig::default(), modules).unwrap()
}

#[test]
fn ioctl_roundtrip_updates_and_greets() {
    let host = boot(&[module("ioctl", &[])]);
    let report = scenarios::ioctl_roundtrip(&host).unwrap();
    assert_eq!(report.initial, 42);
    assert_eq!(report.updated, NEW_ANSWER);

    let example = host.module::<IoctlExample>().unwrap();
    let greeting = example.last_greeting().unwrap();
    assert_eq!((greeting.repeat, greeting.name().as_str()), GREETING);
    host.shutdown();
}

#[test]
fn poll_unlock_reports_readable() {
    let host = boot(&[module("poll", &[])]);
    let mask = scenarios::poll_unlock(&host, &quick()).unwrap();
    assert_eq!(mask, POLLIN | POLLRDNORM);
}

#[test]
fn await_signal_receives_a_tick() {
    let host = boot(&[module("signals", &[("sleep_ms", "10")])]);
    let notification = scenarios::await_signal(&host, &quick()).unwrap();
    assert_eq!(notification.signo, SIGNR);
    assert!(matches!(notification.kind, EventKind::Tick(_)));
}

#[test]
fn await_signal_times_out_without_a_worker_tick() {
    let host = boot(&[module("signals", &[("sleep_ms", "60000")])]);
    let cfg = ScenarioConfig {
        signal_timeout: Duration::from_millis(50),
        ..quick()
    };
    let err = scenarios::await_signal(&host, &cfg).unwrap_err();
    assert!(err.to_string().contains("no signal within"));
}

#[test]
fn echo_and_text_files_read_back() {
    let host = boot(&[
        module("read_write", &[]),
        module("procfs", &[]),
        module("sysfs", &[]),
    ]);
    assert_eq!(scenarios::echo(&host, ECHO_PAYLOAD).unwrap(), ECHO_PAYLOAD);
    assert_eq!(scenarios::proc_read(&host).unwrap(), "Hello from a procfs file\n");
    assert_eq!(
        scenarios::sysfs_read(&host).unwrap(),
        "You have read from /sys/kernel/hello/dummy\n"
    );
}

#[test]
fn scenarios_without_their_module_fail_cleanly() {
    let host = boot(&[module("params", &[])]);
    assert!(scenarios::ioctl_roundtrip(&host).is_err());
    assert!(scenarios::run_applicable(&host, &quick()).is_empty());
}

#[test]
fn failed_module_unloads_the_ones_before_it() {
    let modules = [
        module("read_write", &[]),
        module("params", &[("gpio_id", "not-a-number")]),
    ];
    let err = Host::boot(&KernelConfig::default(), &modules).err().unwrap();
    assert!(format!("{err:#}").contains("params"));
}

#[test]
fn run_executes_every_applicable_scenario() {
    let cfg = Config {
        logging: LoggingConfig::default(),
        kernel: KernelConfig::default(),
        modules: vec![
            module("read_write", &[]),
            module("ioctl", &[]),
            module("poll", &[]),
            module("signals", &[("sleep_ms", "10")]),
            module("procfs", &[]),
            module("sysfs", &[]),
        ],
        scenario: quick(),
    };
    let reports = agent::run(&cfg).unwrap();
    let names: Vec<_> = reports.iter().map(|r| r.name).collect();
    assert_eq!(
        names,
        ["ioctl_roundtrip", "poll_unlock", "await_signal", "echo", "proc_read", "sysfs_read"]
    );
    for report in &reports {
        assert!(report.result.is_ok(), "{} failed: {:?}", report.name, report.result);
    }
}
