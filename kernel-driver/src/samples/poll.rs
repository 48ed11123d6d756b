//! `/dev/lkm_poll`: readable once somebody issues `CMD_UNLOCK`.

use log::Level;
use shared::constants::{CMD_UNLOCK, MY_MAJOR, POLL_NODE};

use crate::control::CommandTable;
use crate::driver::{DriverCore, DriverSpec};
use crate::error::ModuleError;
use crate::kernel::{Kernel, Module, ModuleParams};
use crate::registry::IdentityRequest;

pub struct Poll {
    core: DriverCore<()>,
}

impl Poll {
    pub fn core(&self) -> &DriverCore<()> {
        &self.core
    }
}

impl Module for Poll {
    const NAME: &'static str = "poll";

    fn init(kernel: &Kernel, _params: &ModuleParams) -> Result<Self, ModuleError> {
        let commands = CommandTable::<()>::new().plain(CMD_UNLOCK, |ctx| {
            crate::pr!(Level::Info, Self::NAME, "Waking up polling processes");
            ctx.hooks.signal_ready();
            Ok(())
        });
        let core = DriverCore::load(
            kernel,
            DriverSpec::new("LKM_poll", ())
                .identity(IdentityRequest::Fixed(MY_MAJOR))
                .node(POLL_NODE)
                .pollable()
                .commands(commands),
        )?;
        crate::pr!(Level::Info, Self::NAME, "registered Device number {}", core.number());
        Ok(Self { core })
    }

    fn exit(self, _kernel: &Kernel) {
        self.core.unload();
        crate::pr!(Level::Info, Self::NAME, "exiting!");
    }
}
