//! devcore: a generic character-device driver core.
//!
//! A driver is described by a [`DriverSpec`] and brought up by
//! [`DriverCore::load`] inside a [`Kernel`] (device-number registry, path
//! namespace, interrupt lines, GPIO). Setup is an ordered
//! [`ResourceChain`]: when a step is refused everything acquired before it
//! is released in reverse order, and unload undoes the whole chain exactly
//! once.
//!
//! Once loaded, a driver's node serves:
//! - `read`/`write` through a fixed-capacity [`DataPlane`];
//! - `ioctl` through a sealed [`CommandTable`] ([`ControlPlane`]);
//! - `poll` and blocking waits through a one-shot [`WaitSignal`];
//! - asynchronous signals to one registered task ([`NotificationChannel`]).
//!
//! [`samples`] holds the drivers the user agent exercises.

#[macro_use]
mod macros;

pub mod chain;
pub mod consts;
pub mod control;
pub mod data;
pub mod device;
pub mod driver;
pub mod error;
pub mod gpio;
pub mod irq;
pub mod kernel;
pub mod notify;
pub mod registry;
pub mod samples;
pub mod uaccess;
pub mod vfs;
pub mod wait;
pub mod worker;

#[doc(hidden)]
pub use log as __log;

pub use chain::{FailedAt, ResourceChain, Teardown};
pub use control::{CommandContext, CommandTable, ControlPlane, Direction, Payload};
pub use data::DataPlane;
pub use device::{FileOperations, OpenFile, PollTable, SessionId, SharedOps};
pub use driver::{DriverCore, DriverHooks, DriverSpec, DriverState};
pub use error::{
    AllocationError, CommandError, DeliveryError, DriverError, FileError, Interrupted, LoadError,
    ModuleError, TransferFault,
};
pub use kernel::{Kernel, LoadedModule, Module, ModuleParams};
pub use notify::{EventKind, Notification, NotificationChannel, Task};
pub use registry::{EndpointRegistry, IdentityRequest, Registration, SlotOutcome};
pub use uaccess::{UserSlice, UserSliceMut};
pub use wait::{SignalPending, WaitSignal};
pub use worker::{KThread, StopToken};
