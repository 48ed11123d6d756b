//! The environment drivers are loaded into, and the module interface.

use std::any::Any;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ModuleError;
use crate::gpio::{GpioChip, SimGpio};
use crate::irq::IrqController;
use crate::registry::EndpointRegistry;
use crate::vfs::VirtualFs;

/// Lines on the simulated chip (a Raspberry Pi header exposes 0..=27).
pub const SIM_GPIO_LINES: u32 = 28;

/// Shared kernel services. Clones refer to the same services.
#[derive(Clone)]
pub struct Kernel {
    pub registry: Arc<EndpointRegistry>,
    pub vfs: Arc<VirtualFs>,
    pub irq: Arc<IrqController>,
    pub gpio: Arc<dyn GpioChip>,
}

impl Kernel {
    pub fn new(registry: Arc<EndpointRegistry>, gpio: Arc<dyn GpioChip>) -> Self {
        Self {
            vfs: Arc::new(VirtualFs::new(Arc::clone(&registry))),
            registry,
            irq: Arc::new(IrqController::new()),
            gpio,
        }
    }

    /// A kernel on a simulated GPIO chip; the chip is returned for driving.
    pub fn simulated() -> (Self, Arc<SimGpio>) {
        let chip = Arc::new(SimGpio::new(SIM_GPIO_LINES));
        let kernel = Self::new(Arc::new(EndpointRegistry::new()), chip.clone());
        (kernel, chip)
    }
}

/*──────────────────────────── module params ─────────────────────────────*/

/// `module_param` values given at load time, as strings.
#[derive(Debug, Clone, Default)]
pub struct ModuleParams {
    values: BTreeMap<String, String>,
}

impl ModuleParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_owned(), value.into());
    }

    pub fn get_str(&self, name: &str, default: &str) -> String {
        self.values
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.to_owned())
    }

    /// Parse `name`, falling back to `default` when absent.
    pub fn get<T: FromStr>(&self, name: &str, default: T) -> Result<T, ModuleError> {
        match self.values.get(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ModuleError::InvalidParam {
                name: name.to_owned(),
                value: raw.clone(),
            }),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ModuleParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/*──────────────────────────────── modules ───────────────────────────────*/

/// A loadable unit with `module_init` / `module_exit`.
pub trait Module: Send + Sized + 'static {
    const NAME: &'static str;

    fn init(kernel: &Kernel, params: &ModuleParams) -> Result<Self, ModuleError>;

    /// Release everything `init` acquired.
    fn exit(self, kernel: &Kernel);
}

/// Type-erased loaded module.
pub trait LoadedModule: Send {
    fn name(&self) -> &'static str;
    fn unload(self: Box<Self>, kernel: &Kernel);
    fn as_any(&self) -> &dyn Any;
}

impl<M: Module> LoadedModule for M {
    fn name(&self) -> &'static str {
        M::NAME
    }

    fn unload(self: Box<Self>, kernel: &Kernel) {
        (*self).exit(kernel);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
