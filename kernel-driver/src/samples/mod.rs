//! Driver variants built on the core, one loadable module each.
//!
//! Every module follows the same shape: `init` acquires through a
//! [`crate::ResourceChain`] (directly or via [`crate::DriverCore`]) and
//! `exit` hands everything back in reverse.

use crate::error::ModuleError;
use crate::kernel::{Kernel, LoadedModule, Module, ModuleParams};

pub mod dev_nr;
pub mod gpio;
pub mod interrupts;
pub mod ioctl;
pub mod kthread;
pub mod malloc;
pub mod params;
pub mod poll;
pub mod procfs;
pub mod read_write;
pub mod signals;
pub mod sysfs;

type Loader = fn(&Kernel, &ModuleParams) -> Result<Box<dyn LoadedModule>, ModuleError>;

fn boxed<M: Module>(kernel: &Kernel, params: &ModuleParams) -> Result<Box<dyn LoadedModule>, ModuleError> {
    Ok(Box::new(M::init(kernel, params)?))
}

const LOADERS: [(&str, Loader); 12] = [
    (dev_nr::DevNr::NAME, boxed::<dev_nr::DevNr>),
    (read_write::ReadWrite::NAME, boxed::<read_write::ReadWrite>),
    (gpio::GpioDriver::NAME, boxed::<gpio::GpioDriver>),
    (interrupts::Interrupts::NAME, boxed::<interrupts::Interrupts>),
    (params::Params::NAME, boxed::<params::Params>),
    (ioctl::IoctlExample::NAME, boxed::<ioctl::IoctlExample>),
    (kthread::KThreads::NAME, boxed::<kthread::KThreads>),
    (signals::Signals::NAME, boxed::<signals::Signals>),
    (poll::Poll::NAME, boxed::<poll::Poll>),
    (procfs::ProcFs::NAME, boxed::<procfs::ProcFs>),
    (sysfs::SysFs::NAME, boxed::<sysfs::SysFs>),
    (malloc::AllocTest::NAME, boxed::<malloc::AllocTest>),
];

/// Names accepted by [`load`].
pub fn names() -> impl Iterator<Item = &'static str> {
    LOADERS.iter().map(|(name, _)| *name)
}

/// `insmod`: bring module `name` in with `params`.
pub fn load(
    name: &str,
    kernel: &Kernel,
    params: &ModuleParams,
) -> Result<Box<dyn LoadedModule>, ModuleError> {
    let (_, loader) = LOADERS
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| ModuleError::Unknown(name.to_owned()))?;
    loader(kernel, params)
}
