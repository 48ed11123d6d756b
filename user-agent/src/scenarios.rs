//! User-space programs run against the loaded sample drivers.
//!
//! Each scenario opens a node the way a test program would, exercises one
//! driver and closes it again. [`run_applicable`] runs every scenario whose
//! module is loaded.

use anyhow::{Context, Result, bail};
use log::Level;
use std::thread;

use devcore::samples::ioctl::Greeter;
use devcore::wait::SignalPending;
use devcore::{Notification, Payload, Task, UserSliceMut};
use shared::constants::{
    CMD_UNLOCK, GREETER, IOCTL_NODE, POLL_NODE, PROCFS_FILE, RD_VALUE, READ_WRITE_NODE,
    REGISTER_UAPP, SIGNALS_NODE, SYSFS_FILE, WR_VALUE,
};
use shared::poll::POLLIN;

use crate::config::ScenarioConfig;
use crate::host::Host;

/// What the greeter command is sent with.
pub const GREETING: (i32, &str) = (4, "Guille");
/// Value written by [`ioctl_roundtrip`].
pub const NEW_ANSWER: i32 = 123;
pub const ECHO_PAYLOAD: &[u8] = b"Hello from user space";

fn this_task() -> Task {
    Task::detached(std::process::id())
}

/// Answers seen before and after writing [`NEW_ANSWER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoctlReport {
    pub initial: i32,
    pub updated: i32,
}

/// Read the answer, write a new one, read it back, then greet.
pub fn ioctl_roundtrip(host: &Host) -> Result<IoctlReport> {
    let file = host
        .kernel()
        .vfs
        .open(IOCTL_NODE, this_task())
        .context("opening the ioctl node")?;

    let read_answer = || -> Result<i32> {
        let mut raw = [0u8; i32::SIZE];
        file.ioctl(RD_VALUE, Some(&mut UserSliceMut::new(&mut raw)))
            .context("RD_VALUE")?;
        Ok(i32::decode(&raw))
    };

    let initial = read_answer()?;
    agent_log!(Level::Info, "scenario", "The answer is {}", initial);

    let mut raw = [0u8; i32::SIZE];
    NEW_ANSWER.encode(&mut raw);
    file.ioctl(WR_VALUE, Some(&mut UserSliceMut::new(&mut raw)))
        .context("WR_VALUE")?;
    let updated = read_answer()?;
    agent_log!(Level::Info, "scenario", "The answer is now {}", updated);

    let greeter = Greeter::new(GREETING.0, GREETING.1);
    let mut raw = [0u8; Greeter::SIZE];
    greeter.encode(&mut raw);
    file.ioctl(GREETER, Some(&mut UserSliceMut::new(&mut raw)))
        .context("GREETER")?;

    Ok(IoctlReport { initial, updated })
}

/// One session blocks in poll while another issues `CMD_UNLOCK`.
pub fn poll_unlock(host: &Host, cfg: &ScenarioConfig) -> Result<u32> {
    let vfs = &host.kernel().vfs;
    let waiter = vfs.open(POLL_NODE, this_task()).context("opening the poll node")?;
    let unlocker = vfs.open(POLL_NODE, this_task()).context("opening the poll node")?;
    let pending = SignalPending::new();

    let mask = thread::scope(|s| -> Result<u32> {
        let blocked = s.spawn(|| waiter.poll_timeout(&pending, cfg.poll_timeout));
        let unlocked = unlocker.ioctl(CMD_UNLOCK, None);
        let mask = blocked.join().map_err(|_| anyhow::anyhow!("poll thread panicked"))?;
        unlocked.context("CMD_UNLOCK")?;
        Ok(mask?)
    })?;

    if mask & POLLIN == 0 {
        bail!("device not readable within {:?}", cfg.poll_timeout);
    }
    agent_log!(Level::Info, "scenario", "Poll woke with mask {:#x}", mask);
    Ok(mask)
}

/// Register for the driver's signal and wait for one delivery.
pub fn await_signal(host: &Host, cfg: &ScenarioConfig) -> Result<Notification> {
    let (task, inbox) = Task::with_mailbox(std::process::id());
    let file = host
        .kernel()
        .vfs
        .open(SIGNALS_NODE, task)
        .context("opening the signals node")?;
    file.ioctl(REGISTER_UAPP, None).context("REGISTER_UAPP")?;
    agent_log!(Level::Info, "scenario", "Registered, waiting for a signal");

    let notification = inbox
        .recv_timeout(cfg.signal_timeout)
        .with_context(|| format!("no signal within {:?}", cfg.signal_timeout))?;
    agent_log!(
        Level::Info,
        "scenario",
        "Received signal {} ({:?})",
        notification.signo,
        notification.kind
    );
    file.close();
    Ok(notification)
}

/// Write `payload` to the byte store and read it back.
pub fn echo(host: &Host, payload: &[u8]) -> Result<Vec<u8>> {
    let file = host
        .kernel()
        .vfs
        .open(READ_WRITE_NODE, this_task())
        .context("opening the read/write node")?;
    let written = file.write_bytes(payload).context("write")?;
    let back = file.read_bytes(payload.len().max(1)).context("read")?;
    agent_log!(
        Level::Info,
        "scenario",
        "Wrote {} byte(s), read back {}",
        written,
        back.len()
    );
    Ok(back)
}

fn read_text(host: &Host, path: &str) -> Result<String> {
    let file = host
        .kernel()
        .vfs
        .open(path, this_task())
        .with_context(|| format!("opening {path}"))?;
    let bytes = file.read_bytes(256).with_context(|| format!("reading {path}"))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn proc_read(host: &Host) -> Result<String> {
    read_text(host, PROCFS_FILE)
}

pub fn sysfs_read(host: &Host) -> Result<String> {
    read_text(host, SYSFS_FILE)
}

/*──────────────────────────────── runner ────────────────────────────────*/

type Runner = fn(&Host, &ScenarioConfig) -> Result<String>;

/// A scenario and the module it needs.
pub struct Scenario {
    pub name: &'static str,
    pub module: &'static str,
    run: Runner,
}

pub static SCENARIOS: [Scenario; 6] = [
    Scenario {
        name: "ioctl_roundtrip",
        module: "ioctl",
        run: |host, _| ioctl_roundtrip(host).map(|r| format!("{} -> {}", r.initial, r.updated)),
    },
    Scenario {
        name: "poll_unlock",
        module: "poll",
        run: |host, cfg| poll_unlock(host, cfg).map(|mask| format!("mask {mask:#x}")),
    },
    Scenario {
        name: "await_signal",
        module: "signals",
        run: |host, cfg| await_signal(host, cfg).map(|n| format!("signal {}", n.signo)),
    },
    Scenario {
        name: "echo",
        module: "read_write",
        run: |host, _| {
            echo(host, ECHO_PAYLOAD).map(|b| String::from_utf8_lossy(&b).into_owned())
        },
    },
    Scenario {
        name: "proc_read",
        module: "procfs",
        run: |host, _| proc_read(host),
    },
    Scenario {
        name: "sysfs_read",
        module: "sysfs",
        run: |host, _| sysfs_read(host),
    },
];

/// Outcome of one scenario.
#[derive(Debug)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub result: Result<String>,
}

/// Run every scenario whose module is loaded, in table order.
pub fn run_applicable(host: &Host, cfg: &ScenarioConfig) -> Vec<ScenarioReport> {
    SCENARIOS
        .iter()
        .filter(|s| host.is_loaded(s.module))
        .map(|s| {
            agent_log!(Level::Info, "scenario", "Running {}", s.name);
            let result = (s.run)(host, cfg);
            match &result {
                Ok(summary) => {
                    agent_log!(Level::Info, "scenario", "{}: {}", s.name, summary.trim_end())
                }
                Err(e) => agent_log!(Level::Error, "scenario", "{} failed: {:#}", s.name, e),
            }
            ScenarioReport {
                name: s.name,
                result,
            }
        })
        .collect()
}
