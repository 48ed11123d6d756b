//! Counts interrupts on a shared line without claiming them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::Level;

use crate::chain::{ResourceChain, Teardown};
use crate::error::{DriverError, ModuleError};
use crate::irq::{IrqFlags, IrqReturn};
use crate::kernel::{Kernel, Module, ModuleParams};

/// Keyboard line on a PC.
pub const DEFAULT_IRQ: u32 = 1;
pub const HANDLER_NAME: &str = "my_kbd_handler";

pub struct Interrupts {
    irq: u32,
    count: Arc<AtomicU64>,
    teardown: Teardown<Kernel>,
}

impl Interrupts {
    pub fn irq(&self) -> u32 {
        self.irq
    }

    /// Interrupts seen since load.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Module for Interrupts {
    const NAME: &'static str = "interrupts";

    fn init(kernel: &Kernel, params: &ModuleParams) -> Result<Self, ModuleError> {
        let irq: u32 = params.get("irq", DEFAULT_IRQ)?;
        let count = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&count);

        let teardown = ResourceChain::<Kernel, DriverError>::new(HANDLER_NAME)
            .step(
                "request_irq",
                move |k: &mut Kernel| {
                    k.irq.request_irq(irq, IrqFlags::SHARED, HANDLER_NAME, move |line| {
                        seen.fetch_add(1, Ordering::Relaxed);
                        crate::pr!(
                            Level::Info,
                            HANDLER_NAME,
                            "Interrupted with interrupt ID: {}!",
                            line
                        );
                        IrqReturn::None
                    })?;
                    Ok(())
                },
                move |k: &mut Kernel| {
                    if let Err(e) = k.irq.free_irq(irq, HANDLER_NAME) {
                        crate::pr!(Level::Error, HANDLER_NAME, "{}", e);
                    }
                },
            )
            .run(&mut kernel.clone())?;

        crate::pr!(Level::Info, HANDLER_NAME, "Loaded handler on irq {}", irq);
        Ok(Self {
            irq,
            count,
            teardown,
        })
    }

    fn exit(self, kernel: &Kernel) {
        self.teardown.teardown(&mut kernel.clone());
        crate::pr!(Level::Info, HANDLER_NAME, "Unloaded handler");
    }
}
