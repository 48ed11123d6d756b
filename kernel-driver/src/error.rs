//! Error taxonomy of the driver core.
//!
//! Setup failures ([`AllocationError`], [`DriverError`]) are reported together
//! with the step that refused them through [`crate::chain::FailedAt`]. Per-call
//! failures surface as [`FileError`], which maps onto the negative errno a
//! file operation would return.

use shared::devnum::DeviceNumber;
use shared::errno;
use thiserror::Error;

use crate::chain::FailedAt;
use crate::consts::MAX_MAJOR;
use crate::control::Direction;

/// Identity or memory could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("major {0} is outside 1..={max}", max = MAX_MAJOR)]
    OutOfRange(u32),
    #[error("major {0} is reserved")]
    Unavailable(u32),
    #[error("no free dynamic major")]
    NoDynamicMajor,
    #[error("all minors of major {0} are taken")]
    MinorsExhausted(u32),
    #[error("cannot allocate {0} bytes")]
    OutOfMemory(usize),
    #[error("device {0} is not registered")]
    NotRegistered(DeviceNumber),
    #[error("device {0} already has file operations bound")]
    AlreadyBound(DeviceNumber),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeregisterError {
    #[error("endpoint {0} is not known to this registry")]
    Unknown(DeviceNumber),
}

/// Some bytes of a user transfer could not be copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{not_copied} byte(s) could not be copied across the user boundary")]
pub struct TransferFault {
    pub not_copied: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command {0:#010x}")]
    UnknownCommand(u32),
    #[error("command {id:#010x} is {expected:?}, caller asked for {actual:?}")]
    DirectionMismatch {
        id: u32,
        expected: Direction,
        actual: Direction,
    },
    #[error(transparent)]
    Fault(#[from] TransferFault),
    #[error("invalid argument: {0}")]
    Invalid(String),
}

/// The registered consumer could not be signalled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signal {signo} to pid {pid} not delivered: {reason}")]
pub struct DeliveryError {
    pub pid: u32,
    pub signo: i32,
    pub reason: &'static str,
}

/// A blocking wait was abandoned because the waiter has a signal pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait interrupted by a pending signal")]
pub struct Interrupted;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VfsError {
    #[error("{0}: no such file or directory")]
    NotFound(String),
    #[error("{0}: already exists")]
    Exists(String),
    #[error("{0}: parent directory missing")]
    NoParent(String),
    #[error("{0}: directory not empty")]
    NotEmpty(String),
    #[error("{0}: is a directory")]
    IsDirectory(String),
    #[error("no driver bound to {0}")]
    NoDevice(DeviceNumber),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrqError {
    #[error("irq {0} is held exclusively")]
    Busy(u32),
    #[error("no handler {name:?} on irq {line}")]
    NotRequested { line: u32, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpioError {
    #[error("gpio {0} does not exist")]
    InvalidLine(u32),
    #[error("gpio {0} is already requested")]
    Busy(u32),
    #[error("gpio {0} was not requested")]
    NotRequested(u32),
    #[error("gpio {0} is not configured as an output")]
    NotOutput(u32),
}

/// A resource acquisition step refused.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error("command {0:#010x} appears twice in the command table")]
    DuplicateCommand(u32),
    #[error(transparent)]
    Vfs(#[from] VfsError),
    #[error(transparent)]
    Irq(#[from] IrqError),
    #[error(transparent)]
    Gpio(#[from] GpioError),
    #[error("cannot spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("step {0} ran before the resource it depends on")]
    MissingResource(&'static str),
}

/// Load failure: which step refused and why.
pub type LoadError = FailedAt<DriverError>;

/// Bringing a sample module in failed.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("invalid module parameter {name}={value:?}")]
    InvalidParam { name: String, value: String },
    #[error("unknown module {0:?}")]
    Unknown(String),
}

/// Failure of a single file operation.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("{0} is not implemented by this file")]
    NotSupported(&'static str),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Fault(#[from] TransferFault),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error(transparent)]
    Vfs(#[from] VfsError),
    #[error(transparent)]
    Gpio(#[from] GpioError),
}

impl FileError {
    /// Negative errno the operation would hand back to user space.
    pub fn errno(&self) -> i32 {
        let code = match self {
            FileError::NotSupported("unlocked_ioctl") => errno::ENOTTY,
            FileError::NotSupported(_) => errno::EINVAL,
            FileError::Command(CommandError::UnknownCommand(_)) => errno::ENOTTY,
            FileError::Command(CommandError::Fault(_)) | FileError::Fault(_) => errno::EFAULT,
            FileError::Command(_) => errno::EINVAL,
            FileError::Interrupted(_) => errno::EINTR,
            FileError::Vfs(VfsError::NotFound(_)) => errno::ENOENT,
            FileError::Vfs(VfsError::NoDevice(_)) => errno::ENODEV,
            FileError::Vfs(VfsError::Exists(_)) => errno::EEXIST,
            FileError::Vfs(VfsError::NotEmpty(_)) => errno::ENOTEMPTY,
            FileError::Vfs(_) => errno::EINVAL,
            FileError::Gpio(GpioError::Busy(_)) => errno::EBUSY,
            FileError::Gpio(_) => errno::EIO,
        };
        -code
    }
}
