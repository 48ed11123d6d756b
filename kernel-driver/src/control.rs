//! Command (ioctl) dispatch.
//!
//! Key responsibilities:
//! - Hold a closed, immutable table of command ids with their direction
//!   and payload size.
//! - Stage payloads through a bounded area so a handler never sees a
//!   partially copied argument.
//! - Refuse unknown ids and direction mismatches before any handler runs.

use std::collections::HashMap;
use std::mem::size_of;

use log::Level;
use shared::ioctl::{IOC_NONE, IOC_READ, IOC_WRITE};

use crate::device::OpenFile;
use crate::driver::DriverHooks;
use crate::error::{AllocationError, CommandError, DriverError};
use crate::uaccess::UserSliceMut;

/// Which way a command's payload moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    None,
    ToKernel,
    FromKernel,
    Both,
}

impl Direction {
    /// From the two direction bits of an `_IOC` code.
    pub fn from_ioc(dir: u32) -> Self {
        match dir & (IOC_READ | IOC_WRITE) {
            IOC_NONE => Direction::None,
            IOC_WRITE => Direction::ToKernel,
            IOC_READ => Direction::FromKernel,
            _ => Direction::Both,
        }
    }

    fn to_kernel(self) -> bool {
        matches!(self, Direction::ToKernel | Direction::Both)
    }

    fn from_kernel(self) -> bool {
        matches!(self, Direction::FromKernel | Direction::Both)
    }
}

/// A fixed-size value that crosses the boundary as raw bytes.
pub trait Payload: Sized {
    const SIZE: usize;

    /// `bytes` is exactly `SIZE` long.
    fn decode(bytes: &[u8]) -> Self;

    /// `out` is exactly `SIZE` long.
    fn encode(&self, out: &mut [u8]);
}

macro_rules! int_payload {
    ($($t:ty),*) => {$(
        impl Payload for $t {
            const SIZE: usize = size_of::<$t>();

            fn decode(bytes: &[u8]) -> Self {
                let mut raw = [0u8; size_of::<$t>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$t>::from_ne_bytes(raw)
            }

            fn encode(&self, out: &mut [u8]) {
                out[..Self::SIZE].copy_from_slice(&self.to_ne_bytes());
            }
        }
    )*};
}

int_payload!(i32, u32, i64, u64);

/// What a handler may touch while it runs.
pub struct CommandContext<'a, S> {
    pub state: &'a mut S,
    pub file: &'a OpenFile,
    pub hooks: &'a DriverHooks,
}

impl<S> CommandContext<'_, S> {
    /// Make the calling task this driver's notification consumer.
    pub fn register_caller(&self) {
        self.hooks
            .notifier()
            .register_consumer(self.file.id(), self.file.task().clone());
    }
}

type Handler<S> =
    Box<dyn FnMut(&mut CommandContext<'_, S>, &mut [u8]) -> Result<(), CommandError> + Send>;

struct Command<S> {
    id: u32,
    direction: Direction,
    size: usize,
    handler: Handler<S>,
}

/// Builder for the set of commands a driver accepts.
pub struct CommandTable<S> {
    commands: Vec<Command<S>>,
}

impl<S> Default for CommandTable<S> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl<S: 'static> CommandTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller supplies a `T`.
    pub fn write<T, F>(self, id: u32, mut handler: F) -> Self
    where
        T: Payload + 'static,
        F: FnMut(&mut CommandContext<'_, S>, T) -> Result<(), CommandError> + Send + 'static,
    {
        self.push(id, Direction::ToKernel, T::SIZE, move |ctx, staged| {
            handler(ctx, T::decode(staged))
        })
    }

    /// Caller receives a `T`.
    pub fn read<T, F>(self, id: u32, mut handler: F) -> Self
    where
        T: Payload + 'static,
        F: FnMut(&mut CommandContext<'_, S>) -> Result<T, CommandError> + Send + 'static,
    {
        self.push(id, Direction::FromKernel, T::SIZE, move |ctx, staged| {
            handler(ctx)?.encode(staged);
            Ok(())
        })
    }

    /// Caller supplies a `T` and receives the handler's reply in place.
    pub fn read_write<T, F>(self, id: u32, mut handler: F) -> Self
    where
        T: Payload + 'static,
        F: FnMut(&mut CommandContext<'_, S>, T) -> Result<T, CommandError> + Send + 'static,
    {
        self.push(id, Direction::Both, T::SIZE, move |ctx, staged| {
            handler(ctx, T::decode(staged))?.encode(staged);
            Ok(())
        })
    }

    /// No payload.
    pub fn plain<F>(self, id: u32, mut handler: F) -> Self
    where
        F: FnMut(&mut CommandContext<'_, S>) -> Result<(), CommandError> + Send + 'static,
    {
        self.push(id, Direction::None, 0, move |ctx, _| handler(ctx))
    }

    fn push<F>(mut self, id: u32, direction: Direction, size: usize, handler: F) -> Self
    where
        F: FnMut(&mut CommandContext<'_, S>, &mut [u8]) -> Result<(), CommandError> + Send + 'static,
    {
        self.commands.push(Command {
            id,
            direction,
            size,
            handler: Box::new(handler),
        });
        self
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.commands.iter().map(|c| c.id)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/*──────────────────────────────── dispatch ──────────────────────────────*/

/// The command half of a device file.
pub struct ControlPlane<S> {
    name: String,
    commands: HashMap<u32, Command<S>>,
    staging: Vec<u8>,
}

impl<S> ControlPlane<S> {
    /// Seal `table`. Duplicate ids are refused; the staging area is sized
    /// for the largest payload.
    pub fn new(name: &str, table: CommandTable<S>) -> Result<Self, DriverError> {
        let mut commands = HashMap::with_capacity(table.commands.len());
        let mut largest = 0;
        for command in table.commands {
            largest = largest.max(command.size);
            let id = command.id;
            if commands.insert(id, command).is_some() {
                return Err(DriverError::DuplicateCommand(id));
            }
        }

        let mut staging = Vec::new();
        staging
            .try_reserve_exact(largest)
            .map_err(|_| AllocationError::OutOfMemory(largest))?;
        staging.resize(largest, 0);

        Ok(Self {
            name: name.to_owned(),
            commands,
            staging,
        })
    }

    pub fn contains(&self, id: u32) -> bool {
        self.commands.contains_key(&id)
    }

    /// Run command `id`. `direction` is what the caller encoded in its
    /// request; it must match the table. `arg` is the caller's buffer.
    ///
    /// A to-kernel payload is staged in full before the handler runs; a
    /// from-kernel payload is copied out only after the handler succeeded.
    pub fn dispatch(
        &mut self,
        state: &mut S,
        file: &OpenFile,
        hooks: &DriverHooks,
        id: u32,
        direction: Direction,
        arg: Option<&mut UserSliceMut<'_>>,
    ) -> Result<(), CommandError> {
        let command = self
            .commands
            .get_mut(&id)
            .ok_or(CommandError::UnknownCommand(id))?;

        if direction != command.direction {
            return Err(CommandError::DirectionMismatch {
                id,
                expected: command.direction,
                actual: direction,
            });
        }

        let staged = &mut self.staging[..command.size];
        staged.fill(0);

        let mut arg = arg;
        if command.direction != Direction::None {
            let Some(user) = arg.as_deref_mut() else {
                crate::pr!(Level::Warn, self.name, "command {:#x} without argument", id);
                return Err(CommandError::Invalid(format!("command {id:#x} needs an argument")));
            };
            if command.direction.from_kernel() && !user.access_ok(command.size) {
                return Err(CommandError::Fault(crate::error::TransferFault {
                    not_copied: command.size - user.accessible(),
                }));
            }
            if command.direction.to_kernel() {
                user.copy_from_user(staged).inspect_err(|e| {
                    crate::pr!(Level::Warn, self.name, "command {:#x}: {}", id, e)
                })?;
            }
        }

        let mut ctx = CommandContext { state, file, hooks };
        (command.handler)(&mut ctx, staged)?;

        if command.direction.from_kernel() {
            if let Some(user) = arg {
                user.copy_to_user(staged)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferFault;
    use crate::notify::Task;
    use shared::constants::{RD_VALUE, WR_VALUE};
    use shared::signal::SIGUSR1;

    #[derive(Default)]
    struct Answer {
        value: i32,
        calls: u32,
    }

    fn plane() -> ControlPlane<Answer> {
        let table = CommandTable::<Answer>::new()
            .write::<i32, _>(WR_VALUE, |ctx, v| {
                ctx.state.calls += 1;
                ctx.state.value = v;
                Ok(())
            })
            .read::<i32, _>(RD_VALUE, |ctx| {
                ctx.state.calls += 1;
                Ok(ctx.state.value)
            })
            .read_write::<u32, _>(0xC004_6164, |_, v| Ok(v * 2));
        ControlPlane::new("ctl-test", table).unwrap()
    }

    struct Fixture {
        state: Answer,
        file: OpenFile,
        hooks: DriverHooks,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                state: Answer::default(),
                file: OpenFile::new(Task::detached(1)),
                hooks: DriverHooks::new("ctl-test", SIGUSR1),
            }
        }

        fn run(
            &mut self,
            p: &mut ControlPlane<Answer>,
            id: u32,
            dir: Direction,
            arg: Option<&mut UserSliceMut<'_>>,
        ) -> Result<(), CommandError> {
            p.dispatch(&mut self.state, &self.file, &self.hooks, id, dir, arg)
        }
    }

    #[test]
    fn write_then_read_answer() {
        let (mut p, mut fx) = (plane(), Fixture::new());

        let mut raw = 42i32.to_ne_bytes();
        fx.run(&mut p, WR_VALUE, Direction::ToKernel, Some(&mut UserSliceMut::new(&mut raw)))
            .unwrap();

        let mut out = [0u8; 4];
        fx.run(&mut p, RD_VALUE, Direction::FromKernel, Some(&mut UserSliceMut::new(&mut out)))
            .unwrap();
        assert_eq!(i32::from_ne_bytes(out), 42);
        assert_eq!(fx.state.calls, 2);
    }

    #[test]
    fn read_write_replies_in_place() {
        let (mut p, mut fx) = (plane(), Fixture::new());
        let mut raw = 21u32.to_ne_bytes();
        fx.run(&mut p, 0xC004_6164, Direction::Both, Some(&mut UserSliceMut::new(&mut raw)))
            .unwrap();
        assert_eq!(u32::from_ne_bytes(raw), 42);
    }

    #[test]
    fn unknown_command_never_reaches_a_handler() {
        let (mut p, mut fx) = (plane(), Fixture::new());
        let err = fx.run(&mut p, 0xdead, Direction::None, None).unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand(0xdead));
        assert_eq!(fx.state.calls, 0);
    }

    #[test]
    fn faulting_argument_is_not_handed_to_handler() {
        let (mut p, mut fx) = (plane(), Fixture::new());
        let mut raw = 7i32.to_ne_bytes();
        let mut user = UserSliceMut::new(&mut raw).faulting_at(2);

        let err = fx
            .run(&mut p, WR_VALUE, Direction::ToKernel, Some(&mut user))
            .unwrap_err();
        assert_eq!(err, CommandError::Fault(TransferFault { not_copied: 2 }));
        assert_eq!(fx.state.calls, 0);
        assert_eq!(fx.state.value, 0);
    }

    #[test]
    fn short_destination_is_refused_before_handler() {
        let (mut p, mut fx) = (plane(), Fixture::new());
        let mut out = [0xffu8; 2];
        let err = fx
            .run(&mut p, RD_VALUE, Direction::FromKernel, Some(&mut UserSliceMut::new(&mut out)))
            .unwrap_err();
        assert!(matches!(err, CommandError::Fault(_)));
        assert_eq!(out, [0xff, 0xff]);
        assert_eq!(fx.state.calls, 0);
    }

    #[test]
    fn fault_inside_destination_counts_missing_bytes() {
        let (mut p, mut fx) = (plane(), Fixture::new());
        let mut out = [0xffu8; 8];
        let mut user = UserSliceMut::new(&mut out).faulting_at(1);
        let err = fx
            .run(&mut p, RD_VALUE, Direction::FromKernel, Some(&mut user))
            .unwrap_err();
        assert_eq!(err, CommandError::Fault(TransferFault { not_copied: 3 }));
        assert_eq!(fx.state.calls, 0);
    }

    #[test]
    fn direction_mismatch_is_refused() {
        let (mut p, mut fx) = (plane(), Fixture::new());
        let mut out = [0u8; 4];
        let err = fx
            .run(&mut p, WR_VALUE, Direction::FromKernel, Some(&mut UserSliceMut::new(&mut out)))
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::DirectionMismatch {
                id: WR_VALUE,
                expected: Direction::ToKernel,
                actual: Direction::FromKernel
            }
        );
    }

    #[test]
    fn duplicate_ids_are_rejected_at_construction() {
        let table = CommandTable::<Answer>::new()
            .plain(1, |_| Ok(()))
            .plain(1, |_| Ok(()));
        let err = ControlPlane::new("dup", table).err().unwrap();
        assert!(matches!(err, DriverError::DuplicateCommand(1)));
    }

    #[test]
    fn direction_bits_decode() {
        assert_eq!(Direction::from_ioc(IOC_NONE), Direction::None);
        assert_eq!(Direction::from_ioc(IOC_WRITE), Direction::ToKernel);
        assert_eq!(Direction::from_ioc(IOC_READ), Direction::FromKernel);
        assert_eq!(Direction::from_ioc(IOC_READ | IOC_WRITE), Direction::Both);
    }
}
