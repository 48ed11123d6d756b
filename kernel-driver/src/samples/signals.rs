//! `/dev/signals`: a registered task receives `SIGNR` every `sleep_ms`.

use std::time::Duration;

use log::Level;
use shared::constants::{MY_MAJOR, REGISTER_UAPP, SIGNALS_NODE, SIGNR};

use crate::control::CommandTable;
use crate::driver::{DriverCore, DriverSpec};
use crate::error::ModuleError;
use crate::kernel::{Kernel, Module, ModuleParams};
use crate::notify::EventKind;
use crate::registry::IdentityRequest;

pub const DEFAULT_SLEEP_MS: u64 = 5000;

pub struct Signals {
    core: DriverCore<()>,
}

impl Signals {
    pub fn core(&self) -> &DriverCore<()> {
        &self.core
    }
}

impl Module for Signals {
    const NAME: &'static str = "signals";

    fn init(kernel: &Kernel, params: &ModuleParams) -> Result<Self, ModuleError> {
        let period = Duration::from_millis(params.get("sleep_ms", DEFAULT_SLEEP_MS)?);

        let commands = CommandTable::<()>::new().plain(REGISTER_UAPP, |ctx| {
            ctx.register_caller();
            crate::pr!(
                Level::Info,
                Self::NAME,
                "Userspace app with PID {} is registered",
                ctx.file.task().pid()
            );
            Ok(())
        });

        let core = DriverCore::load(
            kernel,
            DriverSpec::new("LKM_signals", ())
                .identity(IdentityRequest::Fixed(MY_MAJOR))
                .node(SIGNALS_NODE)
                .signal(SIGNR)
                .commands(commands)
                .worker("kthread_1", move |hooks, stop| {
                    crate::pr!(
                        Level::Info,
                        Self::NAME,
                        "Thread function! Sending signal every {:?}...",
                        period
                    );
                    let mut tick = 0;
                    while !stop.sleep(period) {
                        tick += 1;
                        // failures are logged by the channel and not retried
                        let _ = hooks.notify(EventKind::Tick(tick));
                    }
                    crate::pr!(Level::Info, Self::NAME, "Thread finished execution!");
                }),
        )?;
        crate::pr!(Level::Info, Self::NAME, "registered Device number {}", core.number());
        Ok(Self { core })
    }

    fn exit(self, _kernel: &Kernel) {
        crate::pr!(Level::Info, Self::NAME, "Stopping thread and exiting!");
        self.core.unload();
    }
}
