//! Reports the parameters it was loaded with.

use log::Level;

use crate::error::ModuleError;
use crate::kernel::{Kernel, Module, ModuleParams};

pub const DEFAULT_GPIO_ID: u32 = 12;
pub const DEFAULT_DEVICE_NAME: &str = "testdevice";

pub struct Params {
    gpio_id: u32,
    device_name: String,
}

impl Params {
    pub fn gpio_id(&self) -> u32 {
        self.gpio_id
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Module for Params {
    const NAME: &'static str = "params";

    fn init(_kernel: &Kernel, params: &ModuleParams) -> Result<Self, ModuleError> {
        let gpio_id = params.get("gpio_id", DEFAULT_GPIO_ID)?;
        let device_name = params.get_str("device_name", DEFAULT_DEVICE_NAME);

        crate::pr!(Level::Info, Self::NAME, "Hello mundo!");
        crate::pr!(Level::Info, Self::NAME, "Gpio ID: {}", gpio_id);
        crate::pr!(Level::Info, Self::NAME, "Device name: {}", device_name);
        Ok(Self {
            gpio_id,
            device_name,
        })
    }

    fn exit(self, _kernel: &Kernel) {
        crate::pr!(Level::Info, Self::NAME, "Nos vamos!");
    }
}
