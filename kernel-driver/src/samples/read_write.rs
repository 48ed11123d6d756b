//! Byte store behind `/dev/dummydriver`.

use log::Level;
use shared::constants::READ_WRITE_NODE;

use crate::driver::{DriverCore, DriverSpec};
use crate::error::ModuleError;
use crate::kernel::{Kernel, Module, ModuleParams};

pub const BUFFER_SIZE: usize = 255;
pub const DRIVER_NAME: &str = "dummydriver";
pub const DRIVER_CLASS: &str = "MyModuleClass5";

pub struct ReadWrite {
    core: DriverCore<()>,
}

impl ReadWrite {
    pub fn core(&self) -> &DriverCore<()> {
        &self.core
    }
}

impl Module for ReadWrite {
    const NAME: &'static str = "read_write";

    fn init(kernel: &Kernel, _params: &ModuleParams) -> Result<Self, ModuleError> {
        let core = DriverCore::load(
            kernel,
            DriverSpec::new(DRIVER_NAME, ())
                .class(DRIVER_CLASS)
                .node(READ_WRITE_NODE)
                .buffer(BUFFER_SIZE),
        )?;
        crate::pr!(
            Level::Info,
            Self::NAME,
            "Device Nr. Major: {}, Minor: {} was registered!",
            core.number().major,
            core.number().minor
        );
        Ok(Self { core })
    }

    fn exit(self, _kernel: &Kernel) {
        self.core.unload();
        crate::pr!(Level::Info, Self::NAME, "Goodbye, Kernel");
    }
}
