//! A kobject under `/sys/kernel` with one read/write attribute.

use log::Level;
use shared::constants::SYSFS_FILE;

use crate::chain::{ResourceChain, Teardown};
use crate::device::{FileOperations, OpenFile, share};
use crate::error::{DriverError, FileError, ModuleError};
use crate::kernel::{Kernel, Module, ModuleParams};
use crate::uaccess::{UserSlice, UserSliceMut, transferred};

pub const KOBJECT_DIR: &str = "/sys/kernel/hello";
const TAG: &str = "sysfs_test";

fn show() -> String {
    format!("You have read from {SYSFS_FILE}\n")
}

/// The `dummy` attribute: `show` on read, `store` on write.
struct Dummy;

impl FileOperations for Dummy {
    fn read(&mut self, _file: &OpenFile, buf: &mut UserSliceMut<'_>) -> Result<usize, FileError> {
        let text = show();
        let to_copy = buf.len().min(text.len());
        Ok(transferred(
            to_copy,
            buf.copy_to_user(&text.as_bytes()[..to_copy]),
        ))
    }

    fn write(&mut self, _file: &OpenFile, buf: &UserSlice<'_>) -> Result<usize, FileError> {
        let mut text = vec![0u8; buf.len()];
        let copied = transferred(text.len(), buf.copy_from_user(&mut text));
        crate::pr!(
            Level::Info,
            TAG,
            "You wrote '{}' to {}",
            String::from_utf8_lossy(&text[..copied]),
            SYSFS_FILE
        );
        Ok(buf.len())
    }
}

pub struct SysFs {
    teardown: Teardown<Kernel>,
}

impl Module for SysFs {
    const NAME: &'static str = "sysfs";

    fn init(kernel: &Kernel, _params: &ModuleParams) -> Result<Self, ModuleError> {
        crate::pr!(Level::Info, TAG, "Creating {}", SYSFS_FILE);
        let teardown = ResourceChain::<Kernel, DriverError>::new(TAG)
            .step(
                "kobject_create_and_add",
                |k: &mut Kernel| Ok(k.vfs.mkdir(KOBJECT_DIR)?),
                |k: &mut Kernel| {
                    let _ = k.vfs.remove(KOBJECT_DIR);
                },
            )
            .step(
                "sysfs_create_file",
                |k: &mut Kernel| Ok(k.vfs.create_file(SYSFS_FILE, share(Dummy))?),
                |k: &mut Kernel| {
                    let _ = k.vfs.remove(SYSFS_FILE);
                },
            )
            .run(&mut kernel.clone())?;
        Ok(Self { teardown })
    }

    fn exit(self, kernel: &Kernel) {
        crate::pr!(Level::Info, TAG, "Deleting {}", SYSFS_FILE);
        self.teardown.teardown(&mut kernel.clone());
    }
}
