//! An LED on GPIO 4 and a button on GPIO 17 behind one character device.
//!
//! Writing `'0'`/`'1'` switches the LED, reading returns the button level
//! as `"0\n"` or `"1\n"`.

use std::sync::Arc;

use log::Level;
use shared::constants::GPIO_NODE;

use crate::chain::{ResourceChain, Teardown};
use crate::device::{FileOperations, OpenFile, share};
use crate::error::{DriverError, FileError, ModuleError};
use crate::gpio::GpioChip;
use crate::kernel::{Kernel, Module, ModuleParams};
use crate::registry::{EndpointState, IdentityRequest, Registration};
use crate::uaccess::{UserSlice, UserSliceMut, transferred};

pub const OUTPUT_LINE: u32 = 4;
pub const INPUT_LINE: u32 = 17;
pub const DRIVER_NAME: &str = "my_gpio_driver";
const CLASS_DIR: &str = "/sys/class/MyModuleClass";

struct GpioFile {
    chip: Arc<dyn GpioChip>,
}

impl FileOperations for GpioFile {
    fn open(&mut self, _file: &OpenFile) -> Result<(), FileError> {
        crate::pr!(Level::Info, DRIVER_NAME, "open was called!");
        Ok(())
    }

    fn release(&mut self, _file: &OpenFile) {
        crate::pr!(Level::Info, DRIVER_NAME, "close was called!");
    }

    /// Only the level digit counts towards the return value.
    fn read(&mut self, _file: &OpenFile, buf: &mut UserSliceMut<'_>) -> Result<usize, FileError> {
        let text: &[u8] = if self.chip.get_value(INPUT_LINE)? {
            b"1\n"
        } else {
            b"0\n"
        };
        let to_copy = buf.len().min(text.len());
        let copied = transferred(to_copy, buf.copy_to_user(&text[..to_copy]));
        Ok(copied.min(1))
    }

    fn write(&mut self, _file: &OpenFile, buf: &UserSlice<'_>) -> Result<usize, FileError> {
        let mut value = [0u8; 1];
        let copied = transferred(1, buf.copy_from_user(&mut value));
        match (copied, value[0]) {
            (1, b'0') => self.chip.set_value(OUTPUT_LINE, false)?,
            (1, b'1') => self.chip.set_value(OUTPUT_LINE, true)?,
            _ => crate::pr!(Level::Warn, DRIVER_NAME, "Invalid output value to be set"),
        }
        Ok(1)
    }
}

struct GpioCtx {
    kernel: Kernel,
    registration: Option<Registration>,
}

impl GpioCtx {
    fn number(&self) -> Result<shared::devnum::DeviceNumber, DriverError> {
        self.registration
            .as_ref()
            .map(|r| r.endpoint.number())
            .ok_or(DriverError::MissingResource("chrdev_region"))
    }
}

fn claim_output(chip: &dyn GpioChip) -> Result<(), DriverError> {
    chip.request(OUTPUT_LINE, "rpi-gpio-4")?;
    if let Err(e) = chip.direction_output(OUTPUT_LINE, false) {
        chip.free(OUTPUT_LINE);
        return Err(e.into());
    }
    Ok(())
}

fn claim_input(chip: &dyn GpioChip) -> Result<(), DriverError> {
    chip.request(INPUT_LINE, "rpi-gpio-17")?;
    if let Err(e) = chip.direction_input(INPUT_LINE) {
        chip.free(INPUT_LINE);
        return Err(e.into());
    }
    Ok(())
}

pub struct GpioDriver {
    ctx: GpioCtx,
    teardown: Teardown<GpioCtx>,
}

impl GpioDriver {
    pub fn number(&self) -> Option<shared::devnum::DeviceNumber> {
        self.ctx.number().ok()
    }
}

impl Module for GpioDriver {
    const NAME: &'static str = "gpio";

    fn init(kernel: &Kernel, _params: &ModuleParams) -> Result<Self, ModuleError> {
        crate::pr!(Level::Info, DRIVER_NAME, "Hello, Kernel!");
        let chain = ResourceChain::<GpioCtx, DriverError>::new(DRIVER_NAME)
            .step(
                "chrdev_region",
                |ctx: &mut GpioCtx| {
                    let registration = ctx
                        .kernel
                        .registry
                        .register(IdentityRequest::Dynamic, DRIVER_NAME)?;
                    ctx.registration = Some(registration);
                    Ok(())
                },
                |ctx: &mut GpioCtx| {
                    if let Some(Registration { mut endpoint, .. }) = ctx.registration.take() {
                        endpoint.set_state(EndpointState::Deregistering);
                        let _ = ctx.kernel.registry.deregister(endpoint);
                    }
                },
            )
            .step(
                "class",
                |ctx: &mut GpioCtx| Ok(ctx.kernel.vfs.mkdir(CLASS_DIR)?),
                |ctx: &mut GpioCtx| {
                    let _ = ctx.kernel.vfs.remove(CLASS_DIR);
                },
            )
            .step(
                "device_node",
                |ctx: &mut GpioCtx| {
                    let number = ctx.number()?;
                    Ok(ctx.kernel.vfs.mknod(GPIO_NODE, number)?)
                },
                |ctx: &mut GpioCtx| {
                    let _ = ctx.kernel.vfs.remove(GPIO_NODE);
                },
            )
            .step(
                "cdev_add",
                |ctx: &mut GpioCtx| {
                    let number = ctx.number()?;
                    let ops = share(GpioFile {
                        chip: Arc::clone(&ctx.kernel.gpio),
                    });
                    Ok(ctx.kernel.registry.cdev_add(number, ops)?)
                },
                |ctx: &mut GpioCtx| {
                    if let Ok(number) = ctx.number() {
                        ctx.kernel.registry.cdev_del(number);
                    }
                },
            )
            .step(
                "gpio_4",
                |ctx: &mut GpioCtx| claim_output(ctx.kernel.gpio.as_ref()),
                |ctx: &mut GpioCtx| {
                    let _ = ctx.kernel.gpio.set_value(OUTPUT_LINE, false);
                    ctx.kernel.gpio.free(OUTPUT_LINE);
                },
            )
            .step(
                "gpio_17",
                |ctx: &mut GpioCtx| claim_input(ctx.kernel.gpio.as_ref()),
                |ctx: &mut GpioCtx| ctx.kernel.gpio.free(INPUT_LINE),
            );

        let mut ctx = GpioCtx {
            kernel: kernel.clone(),
            registration: None,
        };
        let teardown = chain.run(&mut ctx)?;
        if let Some(registration) = ctx.registration.as_mut() {
            registration.endpoint.set_state(EndpointState::Active);
        }
        Ok(Self { ctx, teardown })
    }

    fn exit(self, _kernel: &Kernel) {
        let GpioDriver { mut ctx, teardown } = self;
        teardown.teardown(&mut ctx);
        crate::pr!(Level::Info, DRIVER_NAME, "Goodbye, Kernel");
    }
}
