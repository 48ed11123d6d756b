//! Claims the fixed major and reports how the slot was granted.

use log::Level;
use shared::constants::MY_MAJOR;

use crate::driver::{DriverCore, DriverSpec};
use crate::error::ModuleError;
use crate::kernel::{Kernel, Module, ModuleParams};
use crate::registry::{IdentityRequest, SlotOutcome};

pub struct DevNr {
    core: DriverCore<()>,
}

impl DevNr {
    pub fn core(&self) -> &DriverCore<()> {
        &self.core
    }
}

impl Module for DevNr {
    const NAME: &'static str = "dev_nr";

    fn init(kernel: &Kernel, _params: &ModuleParams) -> Result<Self, ModuleError> {
        crate::pr!(Level::Info, Self::NAME, "Hello, Kernel!");
        let core = DriverCore::load(
            kernel,
            DriverSpec::new("my_dev_nr", ()).identity(IdentityRequest::Fixed(MY_MAJOR)),
        )?;

        let slot = match core.outcome() {
            SlotOutcome::Shared { existing } => existing,
            SlotOutcome::Fresh | SlotOutcome::Dynamic => core.number(),
        };
        crate::pr!(
            Level::Info,
            Self::NAME,
            "registered Device number Major: {}, Minor: {}",
            slot.major,
            slot.minor
        );
        Ok(Self { core })
    }

    fn exit(self, _kernel: &Kernel) {
        self.core.unload();
        crate::pr!(Level::Info, Self::NAME, "Goodbye, Kernel");
    }
}
