//! Everything that crosses the user/kernel edge as a raw integer.
//!
//! The core works with structured values (`DeviceNumber`, `IoctlCode`).
//! Packing into and out of the C-style integers happens here and nowhere else.

#![no_std]

pub mod constants;

pub mod devnum {
    use core::fmt;

    /// Bits reserved for the minor part of a packed device number.
    pub const MINORBITS: u32 = 20;
    pub const MINORMASK: u32 = (1 << MINORBITS) - 1;

    /// A `(major, minor)` device identity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct DeviceNumber {
        pub major: u32,
        pub minor: u32,
    }

    impl DeviceNumber {
        pub const fn new(major: u32, minor: u32) -> Self {
            Self { major, minor }
        }

        /// `MKDEV(major, minor)`.
        pub const fn encode(self) -> u32 {
            (self.major << MINORBITS) | (self.minor & MINORMASK)
        }

        /// `MAJOR(dev)` / `MINOR(dev)`.
        pub const fn decode(raw: u32) -> Self {
            Self {
                major: raw >> MINORBITS,
                minor: raw & MINORMASK,
            }
        }
    }

    impl fmt::Display for DeviceNumber {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}", self.major, self.minor)
        }
    }
}

pub mod ioctl {
    //! `_IOC` command encoding, asm-generic layout.

    pub const NRBITS: u32 = 8;
    pub const TYPEBITS: u32 = 8;
    pub const SIZEBITS: u32 = 14;

    pub const NRSHIFT: u32 = 0;
    pub const TYPESHIFT: u32 = NRSHIFT + NRBITS;
    pub const SIZESHIFT: u32 = TYPESHIFT + TYPEBITS;
    pub const DIRSHIFT: u32 = SIZESHIFT + SIZEBITS;

    pub const IOC_NONE: u32 = 0;
    pub const IOC_WRITE: u32 = 1;
    pub const IOC_READ: u32 = 2;

    /// Decoded view of a 32-bit command code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IoctlCode {
        pub dir: u32,
        pub kind: u8,
        pub nr: u8,
        pub size: u16,
    }

    impl IoctlCode {
        pub const fn decode(code: u32) -> Self {
            Self {
                dir: (code >> DIRSHIFT) & 0b11,
                kind: ((code >> TYPESHIFT) & 0xff) as u8,
                nr: ((code >> NRSHIFT) & 0xff) as u8,
                size: ((code >> SIZESHIFT) & ((1 << SIZEBITS) - 1)) as u16,
            }
        }

        pub const fn encode(self) -> u32 {
            ioc(self.dir, self.kind, self.nr, self.size as u32)
        }

        /// Caller writes, kernel reads (`_IOW`).
        pub const fn to_kernel(&self) -> bool {
            self.dir & IOC_WRITE != 0
        }

        /// Kernel writes, caller reads (`_IOR`).
        pub const fn from_kernel(&self) -> bool {
            self.dir & IOC_READ != 0
        }
    }

    pub const fn ioc(dir: u32, kind: u8, nr: u8, size: u32) -> u32 {
        (dir << DIRSHIFT)
            | ((kind as u32) << TYPESHIFT)
            | ((nr as u32) << NRSHIFT)
            | (size << SIZESHIFT)
    }

    pub const fn io(kind: u8, nr: u8) -> u32 {
        ioc(IOC_NONE, kind, nr, 0)
    }

    pub const fn iow(kind: u8, nr: u8, size: usize) -> u32 {
        ioc(IOC_WRITE, kind, nr, size as u32)
    }

    pub const fn ior(kind: u8, nr: u8, size: usize) -> u32 {
        ioc(IOC_READ, kind, nr, size as u32)
    }

    pub const fn iowr(kind: u8, nr: u8, size: usize) -> u32 {
        ioc(IOC_READ | IOC_WRITE, kind, nr, size as u32)
    }
}

pub mod poll {
    pub const POLLIN: u32 = 0x0001;
    pub const POLLPRI: u32 = 0x0002;
    pub const POLLOUT: u32 = 0x0004;
    pub const POLLERR: u32 = 0x0008;
    pub const POLLHUP: u32 = 0x0010;
    pub const POLLRDNORM: u32 = 0x0040;
    pub const POLLWRNORM: u32 = 0x0100;

    /// What a file reports when its driver has no poll callback.
    pub const DEFAULT_POLLMASK: u32 = POLLIN | POLLOUT | POLLRDNORM | POLLWRNORM;
}

pub mod errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const EIO: i32 = 5;
    pub const ENOMEM: i32 = 12;
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const ENOTTY: i32 = 25;
    pub const ENOTEMPTY: i32 = 39;
}

pub mod signal {
    pub const SIGUSR1: i32 = 10;
    pub const SIGUSR2: i32 = 12;

    /// `si_code` for signals queued with a payload.
    pub const SI_QUEUE: i32 = -1;
}
