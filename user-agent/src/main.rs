// src/main.rs

//! Agent entry-point.
//!
//! 1. Parse configuration (first argument, or `default.toml` next to the exe)
//! 2. Set up structured logging
//! 3. Boot the simulated kernel and load the configured modules
//! 4. Run the scenarios that apply, then unload in reverse order

use std::{
    env,
    path::{Path, PathBuf},
    process,
};

use agent::{config, logging};

// ───── helpers ──────────────────────────────────────────────────────────────

/// Print an error with context and terminate the process.
macro_rules! fatal {
    ($ctx:expr, $($arg:tt)+) => {{
        eprintln!(
            "[{}][ERROR][{}] {}",
            chrono::Local::now().to_rfc3339(),
            $ctx,
            format!($($arg)+)
        );
        std::process::exit(1);
    }};
}

/// Directory that contains the running executable.
fn exe_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn main() {
    // 1 ─ Context
    let base = exe_dir();
    let cfg_path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| base.join("default.toml"));
    let cfg = config::load(&cfg_path).unwrap_or_else(|e| fatal!("config", "{}", e));

    // 2 ─ Logging
    let log_dir = cfg_path.parent().unwrap_or(&base);
    logging::setup(log_dir, &cfg.logging).unwrap_or_else(|e| fatal!("logging", "{}", e));
    log::info!("Agent bootstrap initiated");

    // 3/4 ─ Kernel, modules, scenarios
    let reports = agent::run(&cfg).unwrap_or_else(|e| fatal!("host", "{:#}", e));

    let failed = reports.iter().filter(|r| r.result.is_err()).count();
    log::info!(
        "{} scenario(s) run, {} failed",
        reports.len(),
        failed
    );
    if failed > 0 {
        process::exit(2);
    }
}
