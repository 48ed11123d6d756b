//! Numeric contracts of the sample drivers, as seen from user space.

use core::mem::size_of;

use crate::ioctl::{io, ior, iow};

/// Major number the fixed-identity samples ask for. Check `/proc/devices`.
pub const MY_MAJOR: u32 = 91;

/// The original headers encode a pointer type in the size field.
const PTR: usize = size_of::<u64>();

/// Store an `i32` answer in the driver.
pub const WR_VALUE: u32 = iow(b'a', b'b', PTR);
/// Fetch the driver's `i32` answer.
pub const RD_VALUE: u32 = ior(b'a', b'b', PTR);
/// Send a greeter record (`repeat: i32`, `name: [u8; 64]`).
pub const GREETER: u32 = iow(b'a', b'c', PTR);

/// Register the calling task as the consumer of driver signals.
pub const REGISTER_UAPP: u32 = io(b'R', b'g');
/// Mark the poll device readable and wake its waiters.
pub const CMD_UNLOCK: u32 = io(b'p', b'u');

/// Signal number delivered by the signals sample.
pub const SIGNR: i32 = crate::signal::SIGUSR1;

/// Length of the greeter's NUL-padded name field.
pub const GREETER_NAME_LEN: usize = 64;

pub const READ_WRITE_NODE: &str = "/dev/dummydriver";
pub const GPIO_NODE: &str = "/dev/my_gpio_driver";
pub const IOCTL_NODE: &str = "/dev/dummy";
pub const SIGNALS_NODE: &str = "/dev/signals";
pub const POLL_NODE: &str = "/dev/lkm_poll";
pub const PROCFS_FILE: &str = "/proc/hello/dummy";
pub const SYSFS_FILE: &str = "/sys/kernel/hello/dummy";
