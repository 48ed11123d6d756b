//! Limits of the simulated character-device namespace.

/*────────── device numbers ─────────*/

/// Highest major a fixed request may ask for (`CHRDEV_MAJOR_MAX - 1`).
pub const MAX_MAJOR: u32 = 511;

/// Dynamic majors are handed out from the top of this window downwards.
pub const DYNAMIC_MAJOR_HIGH: u32 = 254;
pub const DYNAMIC_MAJOR_LOW: u32 = 234;

/// Minors available under one major before registration is refused.
pub const MINORS_PER_MAJOR: u32 = 256;

/*────────── driver defaults ─────────*/

/// Signal delivered to a registered consumer when a driver does not pick one.
pub const DEFAULT_SIGNAL: i32 = shared::signal::SIGUSR1;
