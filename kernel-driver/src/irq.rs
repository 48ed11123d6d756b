//! Interrupt lines with shared or exclusive handlers (`request_irq`).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::Level;

use crate::device::lock;
use crate::error::IrqError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    None,
    Handled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqFlags {
    pub shared: bool,
}

impl IrqFlags {
    pub const SHARED: Self = Self { shared: true };
}

type IrqHandler = Arc<dyn Fn(u32) -> IrqReturn + Send + Sync>;

struct Action {
    name: String,
    flags: IrqFlags,
    handler: IrqHandler,
}

#[derive(Default)]
pub struct IrqController {
    lines: Mutex<BTreeMap<u32, Vec<Action>>>,
}

impl IrqController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handler` to `line`. A line takes several handlers only when
    /// all of them ask for sharing.
    pub fn request_irq<F>(
        &self,
        line: u32,
        flags: IrqFlags,
        name: &str,
        handler: F,
    ) -> Result<(), IrqError>
    where
        F: Fn(u32) -> IrqReturn + Send + Sync + 'static,
    {
        let mut lines = lock(&self.lines);
        let actions = lines.entry(line).or_default();
        if !actions.is_empty() && !(flags.shared && actions.iter().all(|a| a.flags.shared)) {
            return Err(IrqError::Busy(line));
        }
        actions.push(Action {
            name: name.to_owned(),
            flags,
            handler: Arc::new(handler),
        });
        crate::pr!(Level::Info, name, "requested irq {}", line);
        Ok(())
    }

    pub fn free_irq(&self, line: u32, name: &str) -> Result<(), IrqError> {
        let mut lines = lock(&self.lines);
        let not_requested = || IrqError::NotRequested {
            line,
            name: name.to_owned(),
        };
        let actions = lines.get_mut(&line).ok_or_else(not_requested)?;
        let at = actions
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(not_requested)?;
        actions.remove(at);
        if actions.is_empty() {
            lines.remove(&line);
        }
        crate::pr!(Level::Info, name, "freed irq {}", line);
        Ok(())
    }

    /// Deliver one interrupt to every handler on `line`.
    pub fn raise(&self, line: u32) -> IrqReturn {
        let handlers: Vec<IrqHandler> = lock(&self.lines)
            .get(&line)
            .map(|actions| actions.iter().map(|a| Arc::clone(&a.handler)).collect())
            .unwrap_or_default();

        handlers
            .iter()
            .fold(IrqReturn::None, |ret, handler| match handler(line) {
                IrqReturn::Handled => IrqReturn::Handled,
                IrqReturn::None => ret,
            })
    }

    pub fn handlers(&self, line: u32) -> usize {
        lock(&self.lines).get(&line).map_or(0, Vec::len)
    }
}
