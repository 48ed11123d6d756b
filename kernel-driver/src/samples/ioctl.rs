//! Answer store on `/dev/dummy`, driven by ioctl.

use log::Level;
use shared::constants::{GREETER, GREETER_NAME_LEN, IOCTL_NODE, MY_MAJOR, RD_VALUE, WR_VALUE};

use crate::control::{CommandTable, Payload};
use crate::driver::{DriverCore, DriverSpec};
use crate::error::ModuleError;
use crate::kernel::{Kernel, Module, ModuleParams};
use crate::registry::IdentityRequest;

pub const INITIAL_ANSWER: i32 = 42;
const TAG: &str = "ioctl_example";

/// `struct myStruct { int repeat; char name[64]; }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeter {
    pub repeat: i32,
    pub name: [u8; GREETER_NAME_LEN],
}

impl Greeter {
    /// `name` is truncated so the field stays NUL-terminated.
    pub fn new(repeat: i32, name: &str) -> Self {
        let mut field = [0u8; GREETER_NAME_LEN];
        let n = name.len().min(GREETER_NAME_LEN - 1);
        field[..n].copy_from_slice(&name.as_bytes()[..n]);
        Self {
            repeat,
            name: field,
        }
    }

    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(GREETER_NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

impl Payload for Greeter {
    const SIZE: usize = i32::SIZE + GREETER_NAME_LEN;

    fn decode(bytes: &[u8]) -> Self {
        let mut name = [0u8; GREETER_NAME_LEN];
        name.copy_from_slice(&bytes[i32::SIZE..Self::SIZE]);
        Self {
            repeat: i32::decode(&bytes[..i32::SIZE]),
            name,
        }
    }

    fn encode(&self, out: &mut [u8]) {
        self.repeat.encode(&mut out[..i32::SIZE]);
        out[i32::SIZE..Self::SIZE].copy_from_slice(&self.name);
    }
}

#[derive(Debug)]
pub struct IoctlState {
    pub answer: i32,
    pub last_greeting: Option<Greeter>,
}

fn commands() -> CommandTable<IoctlState> {
    CommandTable::<IoctlState>::new()
        .write::<i32, _>(WR_VALUE, |ctx, value| {
            ctx.state.answer = value;
            crate::pr!(Level::Info, TAG, "update the answer to {}", value);
            Ok(())
        })
        .read::<i32, _>(RD_VALUE, |ctx| {
            crate::pr!(Level::Info, TAG, "the answer was copied");
            Ok(ctx.state.answer)
        })
        .write::<Greeter, _>(GREETER, |ctx, greeter| {
            crate::pr!(Level::Info, TAG, "{} greets to {}", greeter.repeat, greeter.name());
            ctx.state.last_greeting = Some(greeter);
            Ok(())
        })
}

pub struct IoctlExample {
    core: DriverCore<IoctlState>,
}

impl IoctlExample {
    pub fn core(&self) -> &DriverCore<IoctlState> {
        &self.core
    }

    pub fn answer(&self) -> i32 {
        self.core.with_state(|s| s.answer)
    }

    pub fn last_greeting(&self) -> Option<Greeter> {
        self.core.with_state(|s| s.last_greeting.clone())
    }
}

impl Module for IoctlExample {
    const NAME: &'static str = "ioctl";

    fn init(kernel: &Kernel, _params: &ModuleParams) -> Result<Self, ModuleError> {
        crate::pr!(Level::Info, TAG, "Hello mundo!");
        let state = IoctlState {
            answer: INITIAL_ANSWER,
            last_greeting: None,
        };
        let core = DriverCore::load(
            kernel,
            DriverSpec::new("my_ioctl_example", state)
                .identity(IdentityRequest::Fixed(MY_MAJOR))
                .node(IOCTL_NODE)
                .commands(commands()),
        )?;
        crate::pr!(
            Level::Info,
            TAG,
            "registered Device number {} (status {})",
            core.number(),
            core.status_code()
        );
        Ok(Self { core })
    }

    fn exit(self, _kernel: &Kernel) {
        self.core.unload();
        crate::pr!(Level::Info, TAG, "Goodbye, Kernel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeter_layout_is_repeat_then_name() {
        let g = Greeter::new(3, "Guille");
        let mut bytes = [0xffu8; Greeter::SIZE];
        g.encode(&mut bytes);

        assert_eq!(Greeter::SIZE, 68);
        assert_eq!(bytes[..4], 3i32.to_ne_bytes());
        assert_eq!(&bytes[4..10], b"Guille");
        assert!(bytes[10..].iter().all(|&b| b == 0));
        assert_eq!(Greeter::decode(&bytes), g);
    }

    #[test]
    fn long_names_keep_a_terminator() {
        let g = Greeter::new(1, &"x".repeat(100));
        assert_eq!(g.name().len(), GREETER_NAME_LEN - 1);
        assert_eq!(g.name[GREETER_NAME_LEN - 1], 0);
    }
}
