// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

#[macro_use]
pub mod macros;

pub mod config;
pub mod host;
pub mod logging;
pub mod scenarios;

use log::Level;

use crate::config::Config;
use crate::host::Host;
use crate::scenarios::ScenarioReport;

/// Boot the configured modules, run the scenarios that apply to them and
/// unload everything again.
pub fn run(cfg: &Config) -> anyhow::Result<Vec<ScenarioReport>> {
    let host = Host::boot(&cfg.kernel, &cfg.modules)?;
    agent_log!(
        Level::Info,
        "agent",
        "Kernel up with {} module(s): {}",
        cfg.modules.len(),
        host.loaded().collect::<Vec<_>>().join(", ")
    );
    let reports = scenarios::run_applicable(&host, &cfg.scenario);
    host.shutdown();
    Ok(reports)
}
