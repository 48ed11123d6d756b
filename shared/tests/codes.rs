//! The numeric command codes must match what the C headers produce on a
//! 64-bit asm-generic target, otherwise existing user-space tools break.

use shared::constants::*;
use shared::devnum::DeviceNumber;
use shared::ioctl::{IoctlCode, IOC_NONE, IOC_READ, IOC_WRITE};

#[test]
fn ioctl_codes_match_linux_values() {
    assert_eq!(WR_VALUE, 0x4008_6162);
    assert_eq!(RD_VALUE, 0x8008_6162);
    assert_eq!(GREETER, 0x4008_6163);
    assert_eq!(REGISTER_UAPP, 0x0000_5267);
}

#[test]
fn decoded_direction_follows_the_code() {
    let wr = IoctlCode::decode(WR_VALUE);
    assert_eq!(wr.dir, IOC_WRITE);
    assert!(wr.to_kernel() && !wr.from_kernel());
    assert_eq!((wr.kind, wr.nr, wr.size), (b'a', b'b', 8));

    let rd = IoctlCode::decode(RD_VALUE);
    assert_eq!(rd.dir, IOC_READ);
    assert!(rd.from_kernel() && !rd.to_kernel());

    assert_eq!(IoctlCode::decode(CMD_UNLOCK).dir, IOC_NONE);
    assert_eq!(IoctlCode::decode(GREETER).encode(), GREETER);
}

#[test]
fn device_numbers_pack_major_above_twenty_bits() {
    let dev = DeviceNumber::new(MY_MAJOR, 3);
    assert_eq!(dev.encode(), (91 << 20) | 3);
    assert_eq!(DeviceNumber::decode(dev.encode()), dev);
    assert_eq!(DeviceNumber::decode(0x0F00_0001), DeviceNumber::new(240, 1));
    assert_eq!(dev.to_string(), "91:3");
}
