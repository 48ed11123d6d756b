//! The simulated kernel the agent drives, with the configured modules loaded.

use anyhow::Context;
use log::Level;
use std::sync::Arc;

use devcore::gpio::SimGpio;
use devcore::{EndpointRegistry, Kernel, LoadedModule, Module, ModuleParams};

use crate::config::ModuleEntry;
use crate::config::model::KernelConfig;

/// Loaded modules are unloaded in reverse order on [`Host::shutdown`] or drop.
pub struct Host {
    kernel: Kernel,
    chip: Arc<SimGpio>,
    loaded: Vec<Box<dyn LoadedModule>>,
}

impl Host {
    /// Boot a kernel and `insmod` every entry in order. If one refuses,
    /// the ones before it are unloaded again.
    pub fn boot(cfg: &KernelConfig, modules: &[ModuleEntry]) -> anyhow::Result<Self> {
        let chip = Arc::new(SimGpio::new(cfg.gpio_lines));
        let kernel = Kernel::new(Arc::new(EndpointRegistry::new()), chip.clone());
        let mut host = Self {
            kernel,
            chip,
            loaded: Vec::with_capacity(modules.len()),
        };

        for entry in modules {
            let params: ModuleParams = entry
                .params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let module = devcore::samples::load(&entry.name, &host.kernel, &params)
                .with_context(|| format!("loading module '{}'", entry.name))?;
            agent_log!(Level::Info, "host", "Loaded module {}", module.name());
            host.loaded.push(module);
        }
        Ok(host)
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn gpio(&self) -> &Arc<SimGpio> {
        &self.chip
    }

    /// Names of the loaded modules, in load order.
    pub fn loaded(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.loaded.iter().map(|m| m.name())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded().any(|n| n == name)
    }

    /// The loaded instance of module type `M`, if any.
    pub fn module<M: Module>(&self) -> Option<&M> {
        self.loaded
            .iter()
            .find_map(|m| m.as_any().downcast_ref::<M>())
    }

    pub fn shutdown(mut self) {
        self.unload_all();
    }

    fn unload_all(&mut self) {
        while let Some(module) = self.loaded.pop() {
            let name = module.name();
            module.unload(&self.kernel);
            agent_log!(Level::Info, "host", "Unloaded module {}", name);
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.unload_all();
    }
}
